// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point that mounts the syslogfs filesystem.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for syslogfs.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::LevelFilter;
use syslogfs::config::{self, FileConfig, Overrides, Owner};
use syslogfs::{mount, LogFilesystem, SyslogConnector};

#[derive(Debug, Parser)]
#[command(
    author = "Lukas Bower",
    version,
    about = "Expose syslog as a write-only filesystem",
    after_help = "Files must be named <label>.stdout (info) or <label>.stderr (err)."
)]
struct Cli {
    /// Syslog address: <tcp|udp>:<address>:<port> or unix:<path> (default is local syslog).
    #[arg(long, value_name = "PROTO:ADDR:PORT")]
    syslog: Option<String>,

    /// Entry permissions, masked with 0222 (default 0200).
    #[arg(long, value_name = "MODE", value_parser = config::parse_mode)]
    perms: Option<u32>,

    /// Trace filesystem operations to stdout.
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Path to an optional TOML settings file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Filesystem name shown in the mount table.
    #[arg(long, value_name = "NAME")]
    fsname: Option<String>,

    /// Directory to mount on.
    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse_from(config::normalize_legacy_flags(env::args_os()));
    let file = match config::resolve_config_path(cli.config.clone()) {
        Some(path) => FileConfig::load(&path)?,
        None => FileConfig::default(),
    };
    let overrides = Overrides {
        syslog: cli.syslog.clone(),
        perms: cli.perms,
        debug: cli.debug,
        fsname: cli.fsname.clone(),
    };
    let settings = config::resolve(&overrides, file, Owner::current())
        .context("invalid configuration")?;
    init_logging(settings.debug);
    log::info!(
        "[main] sink={} facility={:?} perms={:o}",
        settings.mount.sink,
        settings.mount.facility,
        settings.mount.permissions
    );

    let connector = SyslogConnector::new(settings.mount.sink.clone(), settings.mount.facility);
    let filesystem = LogFilesystem::new(Arc::new(settings.mount), Arc::new(connector));
    mount::mount(filesystem, &cli.mountpoint, &settings.fsname)
}

fn init_logging(debug: bool) {
    let default_level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    if debug {
        builder.target(env_logger::Target::Stdout);
    }
    let _ = builder.try_init();
}
