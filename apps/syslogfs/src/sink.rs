// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide persistent syslog connections consumed by the filesystem core.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fmt;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use syslog_wire::{encode_frame, Facility, FrameHeader, Priority, Severity};

/// Well-known local syslog sockets, probed in order.
pub const LOCAL_SOCKET_PATHS: [&str; 3] = ["/dev/log", "/var/run/syslog", "/var/run/log"];

/// Errors raised while dialing or writing to a log sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The address did not split into protocol, host and port.
    #[error("syslog address must match <protocol>:<address>:<port>, got '{0}'")]
    MalformedAddress(String),
    /// The protocol is neither `tcp` nor `udp`.
    #[error("unsupported syslog transport '{0}'")]
    UnsupportedTransport(String),
    /// None of the well-known local sockets accepted a connection.
    #[error("no local syslog socket available")]
    NoLocalSocket,
    /// Opening the transport failed.
    #[error("dial {address}: {source}")]
    Dial {
        /// Sink address being dialed.
        address: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Delivering a frame failed after one reconnect attempt.
    #[error("send to {address}: {source}")]
    Send {
        /// Sink address being written.
        address: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
}

/// Network transport used for remote sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Stream transport; frames are newline terminated.
    Tcp,
    /// One datagram per frame.
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

impl FromStr for Transport {
    type Err = SinkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(SinkError::UnsupportedTransport(other.to_owned())),
        }
    }
}

/// Where log connections are dialed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkAddress {
    /// The host's local syslog daemon.
    Local,
    /// A specific Unix socket speaking the local frame layout, `unix:<path>`.
    Unix(PathBuf),
    /// A remote collector.
    Remote {
        /// Transport protocol.
        transport: Transport,
        /// `host:port` of the collector.
        address: String,
    },
}

impl SinkAddress {
    /// Parse a `<protocol>:<address>:<port>` or `unix:<path>` sink specification.
    pub fn parse(spec: &str) -> Result<Self, SinkError> {
        if let Some(path) = spec.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(SinkError::MalformedAddress(spec.to_owned()));
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        let parts: Vec<&str> = spec.split(':').collect();
        let [protocol, host, port] = parts.as_slice() else {
            return Err(SinkError::MalformedAddress(spec.to_owned()));
        };
        if protocol.is_empty() || host.is_empty() || port.is_empty() {
            return Err(SinkError::MalformedAddress(spec.to_owned()));
        }
        let transport = protocol.parse::<Transport>()?;
        Ok(Self::Remote {
            transport,
            address: format!("{host}:{port}"),
        })
    }

    fn is_network(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

impl Default for SinkAddress {
    fn default() -> Self {
        Self::Local
    }
}

impl fmt::Display for SinkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Remote { transport, address } => write!(f, "{transport}:{address}"),
        }
    }
}

/// One long-lived channel to the log sink with a fixed severity and label.
pub trait LogConnection: Send + Sync + fmt::Debug {
    /// Severity every message on this connection carries.
    fn severity(&self) -> Severity;
    /// Source label the connection was opened with.
    fn label(&self) -> &str;
    /// Deliver one payload as a single message.
    fn send(&self, payload: &[u8]) -> Result<(), SinkError>;
}

/// Factory for log connections.
pub trait LogConnector: Send + Sync {
    /// Open a connection tagged with `severity` and `label`.
    fn connect(&self, severity: Severity, label: &str)
        -> Result<Arc<dyn LogConnection>, SinkError>;
}

#[derive(Debug)]
enum Backend {
    Datagram(UnixDatagram),
    Stream(UnixStream),
    Udp(UdpSocket),
    Tcp(TcpStream),
}

impl Backend {
    fn dial(address: &SinkAddress) -> Result<Self, SinkError> {
        match address {
            SinkAddress::Local => LOCAL_SOCKET_PATHS
                .iter()
                .find_map(|path| Self::dial_unix(Path::new(path)).ok())
                .ok_or(SinkError::NoLocalSocket),
            SinkAddress::Unix(path) => Self::dial_unix(path).map_err(|source| SinkError::Dial {
                address: address.to_string(),
                source,
            }),
            SinkAddress::Remote {
                transport,
                address: target,
            } => Self::dial_remote(*transport, target).map_err(|source| SinkError::Dial {
                address: address.to_string(),
                source,
            }),
        }
    }

    fn dial_unix(path: &Path) -> io::Result<Self> {
        let datagram = UnixDatagram::unbound()?;
        match datagram.connect(path) {
            Ok(()) => Ok(Self::Datagram(datagram)),
            Err(_) => UnixStream::connect(path).map(Self::Stream),
        }
    }

    fn dial_remote(transport: Transport, target: &str) -> io::Result<Self> {
        match transport {
            Transport::Tcp => TcpStream::connect(target).map(Self::Tcp),
            Transport::Udp => {
                let remote = target.to_socket_addrs()?.next().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
                })?;
                let local: SocketAddr = if remote.is_ipv4() {
                    ([0u8; 4], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                let socket = UdpSocket::bind(local)?;
                socket.connect(remote)?;
                Ok(Self::Udp(socket))
            }
        }
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        match self {
            Self::Datagram(socket) => socket.send(frame).map(|_| ()),
            Self::Udp(socket) => socket.send(frame).map(|_| ()),
            Self::Stream(stream) => stream.write_all(frame),
            Self::Tcp(stream) => stream.write_all(frame),
        }
    }
}

/// Syslog-backed [`LogConnection`].
///
/// The transport sits behind a mutex so writes from concurrent handles are
/// delivered one frame at a time.
#[derive(Debug)]
pub struct SyslogConnection {
    address: SinkAddress,
    priority: Priority,
    label: String,
    tag: String,
    hostname: Option<String>,
    pid: u32,
    backend: Mutex<Option<Backend>>,
}

impl SyslogConnection {
    /// Dial `address` and bind the connection to `priority` and `label`.
    pub fn dial(
        address: SinkAddress,
        priority: Priority,
        label: &str,
        tag: &str,
        hostname: &str,
    ) -> Result<Self, SinkError> {
        let backend = Backend::dial(&address)?;
        let hostname = address.is_network().then(|| hostname.to_owned());
        Ok(Self {
            address,
            priority,
            label: label.to_owned(),
            tag: tag.to_owned(),
            hostname,
            pid: std::process::id(),
            backend: Mutex::new(Some(backend)),
        })
    }

    fn frame(&self, payload: &[u8]) -> Vec<u8> {
        let header = FrameHeader {
            priority: self.priority,
            timestamp: Local::now().fixed_offset(),
            hostname: self.hostname.as_deref(),
            tag: &self.tag,
            pid: self.pid,
        };
        encode_frame(&header, payload)
    }
}

impl LogConnection for SyslogConnection {
    fn severity(&self) -> Severity {
        self.priority.severity
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let frame = self.frame(payload);
        let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = backend.as_mut() {
            match active.send(&frame) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    log::debug!("[sink] {} write failed, redialing: {err}", self.address);
                    *backend = None;
                }
            }
        }
        let mut fresh = Backend::dial(&self.address)?;
        fresh.send(&frame).map_err(|source| SinkError::Send {
            address: self.address.to_string(),
            source,
        })?;
        *backend = Some(fresh);
        Ok(())
    }
}

/// Opens [`SyslogConnection`]s against one configured sink.
#[derive(Debug, Clone)]
pub struct SyslogConnector {
    address: SinkAddress,
    facility: Facility,
    hostname: String,
    program: String,
}

impl SyslogConnector {
    /// Build a connector for `address`, tagging messages with `facility`.
    #[must_use]
    pub fn new(address: SinkAddress, facility: Facility) -> Self {
        let hostname = nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_owned());
        Self {
            address,
            facility,
            hostname,
            program: program_name(),
        }
    }
}

impl LogConnector for SyslogConnector {
    fn connect(
        &self,
        severity: Severity,
        label: &str,
    ) -> Result<Arc<dyn LogConnection>, SinkError> {
        // An empty label still needs a tag the daemon can attribute.
        let tag = if label.is_empty() {
            self.program.as_str()
        } else {
            label
        };
        let connection = SyslogConnection::dial(
            self.address.clone(),
            Priority::new(self.facility, severity),
            label,
            tag,
            &self.hostname,
        )?;
        Ok(Arc::new(connection))
    }
}

fn program_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .map(Path::new)
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "syslogfs".to_owned())
}
