// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Resolve the immutable mount configuration from CLI flags and an optional TOML file.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use syslog_wire::{Facility, WireError};

use crate::sink::{SinkAddress, SinkError};

/// Write bits honoured in the `perms` option.
pub const PERMISSION_MASK: u32 = 0o222;
/// Default entry permissions: owner write only.
pub const DEFAULT_PERMISSIONS: u32 = 0o200;
/// Default filesystem name shown in the mount table.
pub const DEFAULT_FSNAME: &str = "syslogfs";
/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "SYSLOGFS_CONFIG";

/// Flags that may be spelled with a single leading dash.
const LEGACY_FLAGS: [&str; 7] = [
    "syslog", "perms", "debug", "config", "fsname", "help", "version",
];

/// Errors raised while building the mount configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The permission value is not an integer literal.
    #[error("invalid permission mode '{0}'")]
    InvalidMode(String),
    /// The sink specification is malformed.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// The facility name is unknown.
    #[error(transparent)]
    Facility(#[from] WireError),
    /// The configuration file could not be read.
    #[error("read {path}: {source}")]
    Read {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for this schema.
    #[error("parse {path}: {source}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
}

/// Identity reported as the owner of every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
}

impl Owner {
    /// Identity of the running process.
    #[must_use]
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

/// Process-wide settings read by every node. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountConfig {
    /// Where new log connections are dialed.
    pub sink: SinkAddress,
    /// Facility combined with each entry's severity.
    pub facility: Facility,
    /// Permission bits reported for entries, already masked.
    pub permissions: u16,
    /// Owner reported for every node.
    pub owner: Owner,
}

impl MountConfig {
    /// Build a configuration, masking `permissions` to the write bits.
    #[must_use]
    pub fn new(sink: SinkAddress, facility: Facility, permissions: u32, owner: Owner) -> Self {
        Self {
            sink,
            facility,
            permissions: mask_permissions(permissions),
            owner,
        }
    }
}

/// Optional settings file.
///
/// ```toml
/// syslog = "udp:10.0.0.5:514"
/// perms = 0o220
/// facility = "local3"
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Sink specification, `<protocol>:<address>:<port>` or `unix:<path>`.
    pub syslog: Option<String>,
    /// Entry permission bits.
    pub perms: Option<u32>,
    /// Enable operation tracing.
    pub debug: Option<bool>,
    /// Filesystem name for the mount table.
    pub fsname: Option<String>,
    /// Syslog facility name.
    pub facility: Option<String>,
}

impl FileConfig {
    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }
}

/// Values supplied on the command line; these win over the file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Overrides {
    /// `-syslog` value.
    pub syslog: Option<String>,
    /// `-perms` value.
    pub perms: Option<u32>,
    /// `-debug` flag.
    pub debug: bool,
    /// `-fsname` value.
    pub fsname: Option<String>,
}

/// Fully resolved startup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Configuration shared with the filesystem.
    pub mount: MountConfig,
    /// Trace filesystem operations.
    pub debug: bool,
    /// Filesystem name for the mount table.
    pub fsname: String,
}

/// Merge CLI overrides over file values and defaults.
pub fn resolve(cli: &Overrides, file: FileConfig, owner: Owner) -> Result<Settings, ConfigError> {
    let sink = match cli.syslog.as_deref().or(file.syslog.as_deref()) {
        Some(spec) if !spec.is_empty() => SinkAddress::parse(spec)?,
        _ => SinkAddress::Local,
    };
    let facility = match file.facility.as_deref() {
        Some(name) => name.parse::<Facility>()?,
        None => Facility::Daemon,
    };
    let permissions = cli.perms.or(file.perms).unwrap_or(DEFAULT_PERMISSIONS);
    Ok(Settings {
        mount: MountConfig::new(sink, facility, permissions, owner),
        debug: cli.debug || file.debug.unwrap_or(false),
        fsname: cli
            .fsname
            .clone()
            .or(file.fsname)
            .unwrap_or_else(|| DEFAULT_FSNAME.to_owned()),
    })
}

/// Pick the configuration file from the CLI or [`CONFIG_ENV`].
#[must_use]
pub fn resolve_config_path(cli_path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path);
    }
    let value = std::env::var(CONFIG_ENV).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

/// Keep only the owner, group and other write bits.
#[must_use]
pub fn mask_permissions(mode: u32) -> u16 {
    // Masked value always fits in 9 bits.
    (mode & PERMISSION_MASK) as u16
}

/// Parse an integer literal with an optional radix prefix.
///
/// A leading `0` means octal, as do `0o`; `0x` is hex and `0b` binary.
pub fn parse_mode(text: &str) -> Result<u32, ConfigError> {
    let trimmed = text.trim();
    let lower = trimmed.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else if lower.len() > 1 && lower.starts_with('0') {
        (&lower[1..], 8)
    } else {
        (lower.as_str(), 10)
    };
    u32::from_str_radix(digits, radix).map_err(|_| ConfigError::InvalidMode(trimmed.to_owned()))
}

/// Rewrite `-flag` spellings of known long options to `--flag`.
///
/// Arguments after a bare `--` are left untouched.
pub fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut terminated = false;
    let mut normalized = Vec::new();
    for (index, arg) in args.into_iter().enumerate() {
        if index == 0 || terminated {
            normalized.push(arg);
            continue;
        }
        let rewritten = match arg.to_str() {
            Some("--") => {
                terminated = true;
                None
            }
            Some(text) if is_legacy_flag(text) => Some(OsString::from(format!("-{text}"))),
            _ => None,
        };
        normalized.push(rewritten.unwrap_or(arg));
    }
    normalized
}

fn is_legacy_flag(text: &str) -> bool {
    let Some(body) = text.strip_prefix('-') else {
        return false;
    };
    if body.starts_with('-') {
        return false;
    }
    let name = body.split_once('=').map_or(body, |(name, _)| name);
    LEGACY_FLAGS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::Transport;

    fn owner() -> Owner {
        Owner { uid: 1000, gid: 100 }
    }

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn parse_mode_accepts_go_style_literals() {
        assert_eq!(parse_mode("0200").expect("octal"), 0o200);
        assert_eq!(parse_mode("0o222").expect("octal prefix"), 0o222);
        assert_eq!(parse_mode("0x92").expect("hex"), 0x92);
        assert_eq!(parse_mode("128").expect("decimal"), 128);
        assert_eq!(parse_mode("0").expect("zero"), 0);
        assert!(parse_mode("rw").is_err());
        assert!(parse_mode("0o9").is_err());
    }

    #[test]
    fn permissions_keep_only_write_bits() {
        assert_eq!(mask_permissions(0o777), 0o222);
        assert_eq!(mask_permissions(0o644), 0o200);
        assert_eq!(mask_permissions(0o555), 0);
    }

    #[test]
    fn defaults_use_local_sink_and_owner_write() {
        let settings = resolve(&Overrides::default(), FileConfig::default(), owner())
            .expect("defaults");
        assert_eq!(settings.mount.sink, SinkAddress::Local);
        assert_eq!(settings.mount.permissions, 0o200);
        assert_eq!(settings.mount.facility, Facility::Daemon);
        assert_eq!(settings.fsname, DEFAULT_FSNAME);
        assert!(!settings.debug);
    }

    #[test]
    fn cli_wins_over_file() {
        let file: FileConfig = toml::from_str(
            "syslog = \"tcp:file-host:601\"\nperms = 0o022\nfacility = \"local1\"\nfsname = \"fromfile\"\n",
        )
        .expect("toml");
        let cli = Overrides {
            syslog: Some("udp:cli-host:514".to_owned()),
            perms: Some(0o777),
            debug: true,
            fsname: None,
        };
        let settings = resolve(&cli, file, owner()).expect("resolve");
        assert_eq!(
            settings.mount.sink,
            SinkAddress::Remote {
                transport: Transport::Udp,
                address: "cli-host:514".to_owned(),
            }
        );
        assert_eq!(settings.mount.permissions, 0o222);
        assert_eq!(settings.mount.facility, Facility::Local1);
        assert_eq!(settings.fsname, "fromfile");
        assert!(settings.debug);
    }

    #[test]
    fn file_selects_unix_socket_sink() {
        let file: FileConfig =
            toml::from_str("syslog = \"unix:/run/log.sock\"\n").expect("toml");
        let settings = resolve(&Overrides::default(), file, owner()).expect("resolve");
        assert_eq!(
            settings.mount.sink,
            SinkAddress::Unix(PathBuf::from("/run/log.sock"))
        );
    }

    #[test]
    fn malformed_sink_is_fatal() {
        let cli = Overrides {
            syslog: Some("udp:host".to_owned()),
            ..Overrides::default()
        };
        let err = resolve(&cli, FileConfig::default(), owner()).expect_err("malformed");
        assert!(matches!(err, ConfigError::Sink(SinkError::MalformedAddress(_))));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("perm = 1\n").is_err());
    }

    #[test]
    fn single_dash_flags_are_normalized() {
        let args = normalize_legacy_flags(os(&[
            "syslogfs",
            "-syslog",
            "udp:h:514",
            "-perms=0220",
            "-debug",
            "--fsname",
            "x",
            "/mnt/log",
        ]));
        assert_eq!(
            args,
            os(&[
                "syslogfs",
                "--syslog",
                "udp:h:514",
                "--perms=0220",
                "--debug",
                "--fsname",
                "x",
                "/mnt/log",
            ])
        );
    }

    #[test]
    fn normalization_stops_at_terminator() {
        let args = normalize_legacy_flags(os(&["syslogfs", "--", "-debug"]));
        assert_eq!(args, os(&["syslogfs", "--", "-debug"]));
        let args = normalize_legacy_flags(os(&["syslogfs", "-x", "-d"]));
        assert_eq!(args, os(&["syslogfs", "-x", "-d"]));
    }
}
