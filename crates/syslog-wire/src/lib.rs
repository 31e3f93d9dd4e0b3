// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define syslog priority vocabulary and RFC 3164 frame encoding.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Syslog wire vocabulary shared by the syslogfs sink adapter.
//!
//! Frames follow the BSD syslog layout. Local sockets receive the short
//! header (`<PRI>Mmm dd hh:mm:ss TAG[PID]: `); network transports receive
//! an RFC 3339 timestamp and the sending host name.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, SecondsFormat};

/// Errors raised while interpreting syslog vocabulary.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    /// The supplied facility name is not a syslog facility.
    #[error("unknown syslog facility '{0}'")]
    UnknownFacility(String),
}

/// Message severity, lowest value is most urgent.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// System is unusable.
    Emergency = 0,
    /// Action must be taken immediately.
    Alert = 1,
    /// Critical conditions.
    Critical = 2,
    /// Error conditions.
    Error = 3,
    /// Warning conditions.
    Warning = 4,
    /// Normal but significant condition.
    Notice = 5,
    /// Informational messages.
    Informational = 6,
    /// Debug-level messages.
    Debug = 7,
}

impl Severity {
    /// Numeric severity as carried in the priority field.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Conventional lowercase keyword for the severity.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Emergency => "emerg",
            Self::Alert => "alert",
            Self::Critical => "crit",
            Self::Error => "err",
            Self::Warning => "warning",
            Self::Notice => "notice",
            Self::Informational => "info",
            Self::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Originating subsystem class of a message.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facility {
    /// Kernel messages.
    Kern = 0,
    /// User-level messages.
    User = 1,
    /// Mail system.
    Mail = 2,
    /// System daemons.
    Daemon = 3,
    /// Security and authorization messages.
    Auth = 4,
    /// Messages generated internally by syslogd.
    Syslog = 5,
    /// Line printer subsystem.
    Lpr = 6,
    /// Network news subsystem.
    News = 7,
    /// UUCP subsystem.
    Uucp = 8,
    /// Clock daemon.
    Cron = 9,
    /// Private security and authorization messages.
    AuthPriv = 10,
    /// FTP daemon.
    Ftp = 11,
    /// Local use 0.
    Local0 = 16,
    /// Local use 1.
    Local1 = 17,
    /// Local use 2.
    Local2 = 18,
    /// Local use 3.
    Local3 = 19,
    /// Local use 4.
    Local4 = 20,
    /// Local use 5.
    Local5 = 21,
    /// Local use 6.
    Local6 = 22,
    /// Local use 7.
    Local7 = 23,
}

impl Facility {
    /// Numeric facility as carried in the priority field.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl Default for Facility {
    fn default() -> Self {
        Self::Daemon
    }
}

impl FromStr for Facility {
    type Err = WireError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let facility = match value {
            "kern" => Self::Kern,
            "user" => Self::User,
            "mail" => Self::Mail,
            "daemon" => Self::Daemon,
            "auth" => Self::Auth,
            "syslog" => Self::Syslog,
            "lpr" => Self::Lpr,
            "news" => Self::News,
            "uucp" => Self::Uucp,
            "cron" => Self::Cron,
            "authpriv" => Self::AuthPriv,
            "ftp" => Self::Ftp,
            "local0" => Self::Local0,
            "local1" => Self::Local1,
            "local2" => Self::Local2,
            "local3" => Self::Local3,
            "local4" => Self::Local4,
            "local5" => Self::Local5,
            "local6" => Self::Local6,
            "local7" => Self::Local7,
            other => return Err(WireError::UnknownFacility(other.to_owned())),
        };
        Ok(facility)
    }
}

/// Facility and severity pair encoded in the `<PRI>` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Priority {
    /// Originating facility.
    pub facility: Facility,
    /// Message severity.
    pub severity: Severity,
}

impl Priority {
    /// Combine a facility and severity.
    #[must_use]
    pub fn new(facility: Facility, severity: Severity) -> Self {
        Self { facility, severity }
    }

    /// Encoded priority value.
    #[must_use]
    pub fn code(self) -> u8 {
        (self.facility.code() << 3) | self.severity.code()
    }
}

/// Header fields preceding each payload on the wire.
#[derive(Debug, Clone)]
pub struct FrameHeader<'a> {
    /// Priority prefix.
    pub priority: Priority,
    /// Time the message was emitted.
    pub timestamp: DateTime<FixedOffset>,
    /// Sending host; `None` selects the local socket layout.
    pub hostname: Option<&'a str>,
    /// Program tag.
    pub tag: &'a str,
    /// Sending process identifier.
    pub pid: u32,
}

/// Encode a complete frame for `payload`.
///
/// The payload is copied byte for byte. A trailing newline is appended when
/// the payload does not already end with one.
#[must_use]
pub fn encode_frame(header: &FrameHeader<'_>, payload: &[u8]) -> Vec<u8> {
    let prefix = match header.hostname {
        None => format!(
            "<{}>{} {}[{}]: ",
            header.priority.code(),
            header.timestamp.format("%b %e %H:%M:%S"),
            header.tag,
            header.pid
        ),
        Some(hostname) => format!(
            "<{}>{} {} {}[{}]: ",
            header.priority.code(),
            header.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            hostname,
            header.tag,
            header.pid
        ),
    };
    let mut frame = Vec::with_capacity(prefix.len() + payload.len() + 1);
    frame.extend_from_slice(prefix.as_bytes());
    frame.extend_from_slice(payload);
    if !payload.ends_with(b"\n") {
        frame.push(b'\n');
    }
    frame
}
