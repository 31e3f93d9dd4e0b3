// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Implement the directory, file and handle nodes of the log filesystem.
// Author: Lukas Bower
#![forbid(unsafe_code)]

//! Filesystem nodes backed by the connection registry.
//!
//! There is one flat directory. Creating `<label>.stdout` or
//! `<label>.stderr` inside it provisions a log connection the first time the
//! name is seen; every later create, lookup and open of that name reuses it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use syslog_wire::Severity;

use crate::config::MountConfig;
use crate::registry::ConnectionRegistry;
use crate::sink::{LogConnection, LogConnector, SinkError};

/// Permission bits reported for the root directory.
pub const DIRECTORY_PERMISSIONS: u16 = 0o755;

/// Suffix selecting informational severity.
pub const STDOUT_SUFFIX: &str = "stdout";
/// Suffix selecting error severity.
pub const STDERR_SUFFIX: &str = "stderr";

/// Errors returned by node operations.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// No entry with this name exists.
    #[error("no entry named '{0}'")]
    NotFound(String),
    /// The name has no `.` separated suffix.
    #[error("invalid name '{0}': missing suffix")]
    MissingSuffix(String),
    /// The suffix is neither `stdout` nor `stderr`.
    #[error("unsupported suffix '{suffix}' in '{name}'")]
    UnsupportedSuffix {
        /// Requested entry name.
        name: String,
        /// Offending suffix.
        suffix: String,
    },
    /// A directory was requested where only regular files may be created.
    #[error("cannot create directory '{0}'")]
    IsDirectory(String),
    /// A special file was requested.
    #[error("unsupported entry kind for '{0}'")]
    UnsupportedKind(String),
    /// A directory operation was attempted on a file.
    #[error("operation invalid on this node kind")]
    NotDirectory,
    /// A read or read-write open was requested.
    #[error("entry is write-only")]
    WriteOnly,
    /// A read was attempted through a handle.
    #[error("log entries cannot be read")]
    ReadUnsupported,
    /// The log connection could not be opened.
    #[error("log sink unavailable: {0}")]
    Sink(#[from] SinkError),
}

impl FsError {
    /// Errno reported to the host for this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::MissingSuffix(_) | Self::UnsupportedSuffix { .. } | Self::UnsupportedKind(_) => {
                libc::EINVAL
            }
            Self::IsDirectory(_) => libc::EISDIR,
            Self::NotDirectory => libc::ENOTDIR,
            Self::WriteOnly => libc::EACCES,
            Self::ReadUnsupported => libc::EBADF,
            Self::Sink(_) => libc::EIO,
        }
    }
}

/// Kind of entry requested by a create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Device, fifo, socket or symlink.
    Other,
}

impl EntryKind {
    /// Classify the file type bits of `mode`. Missing type bits mean regular.
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        let kind = mode & libc::S_IFMT as u32;
        if kind == 0 || kind == libc::S_IFREG as u32 {
            Self::Regular
        } else if kind == libc::S_IFDIR as u32 {
            Self::Directory
        } else {
            Self::Other
        }
    }
}

/// Access mode of an open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// `O_RDONLY`.
    ReadOnly,
    /// `O_WRONLY`.
    WriteOnly,
    /// `O_RDWR`.
    ReadWrite,
}

impl AccessMode {
    /// Decode the access mode from open flags.
    #[must_use]
    pub fn from_flags(flags: i32) -> Self {
        match flags & libc::O_ACCMODE {
            libc::O_RDONLY => Self::ReadOnly,
            libc::O_WRONLY => Self::WriteOnly,
            _ => Self::ReadWrite,
        }
    }
}

/// Open request as seen by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenRequest {
    /// The host asked for a directory open.
    pub directory: bool,
    /// Requested access.
    pub access: AccessMode,
}

impl OpenRequest {
    /// A regular open with the given access mode.
    #[must_use]
    pub fn file(access: AccessMode) -> Self {
        Self {
            directory: false,
            access,
        }
    }
}

bitflags! {
    /// Flags returned with a successful open, matching the FUSE `FOPEN_*` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Bypass the page cache; every write reaches the handle.
        const DIRECT_IO = 1 << 0;
        /// The file offset is meaningless.
        const NONSEEKABLE = 1 << 2;
    }
}

/// Flags every log handle is opened with.
pub const LOG_HANDLE_FLAGS: OpenFlags = OpenFlags::DIRECT_IO.union(OpenFlags::NONSEEKABLE);

/// Metadata reported for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    /// Node kind; only `Regular` and `Directory` are produced.
    pub kind: EntryKind,
    /// Size in bytes, always zero.
    pub size: u64,
    /// Permission bits.
    pub permissions: u16,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Last access time.
    pub accessed: SystemTime,
    /// Last modification time.
    pub modified: SystemTime,
    /// Last status change time.
    pub changed: SystemTime,
    /// Creation time.
    pub created: SystemTime,
}

/// A parsed `<label>.<suffix>` entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryName {
    /// Full name as supplied.
    pub name: String,
    /// Everything before the final `.`.
    pub label: String,
    /// Severity selected by the suffix.
    pub severity: Severity,
}

impl EntryName {
    /// Split `name` on its final `.` and map the suffix to a severity.
    pub fn parse(name: &str) -> Result<Self, FsError> {
        let Some((label, suffix)) = name.rsplit_once('.') else {
            return Err(FsError::MissingSuffix(name.to_owned()));
        };
        let severity = match suffix {
            STDERR_SUFFIX => Severity::Error,
            STDOUT_SUFFIX => Severity::Informational,
            other => {
                return Err(FsError::UnsupportedSuffix {
                    name: name.to_owned(),
                    suffix: other.to_owned(),
                })
            }
        };
        Ok(Self {
            name: name.to_owned(),
            label: label.to_owned(),
            severity,
        })
    }
}

/// Create request as seen by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Requested entry name.
    pub name: String,
    /// Requested entry kind.
    pub kind: EntryKind,
}

impl CreateRequest {
    /// Request a regular file called `name`.
    #[must_use]
    pub fn regular(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Regular,
        }
    }
}

/// Result of a successful create.
#[derive(Debug, Clone)]
pub struct Created {
    /// Node for the entry.
    pub node: FileNode,
    /// Handle already open for writing.
    pub handle: FileHandle,
    /// Flags for the open response.
    pub flags: OpenFlags,
}

/// Result of a successful open.
#[derive(Debug, Clone)]
pub struct Opened {
    /// Handle bound to the entry's connection.
    pub handle: FileHandle,
    /// Flags for the open response.
    pub flags: OpenFlags,
}

/// Filesystem root; owns the connection registry.
pub struct LogFilesystem {
    registry: Arc<ConnectionRegistry>,
    connector: Arc<dyn LogConnector>,
    config: Arc<MountConfig>,
}

impl LogFilesystem {
    /// Build an empty filesystem dialing connections through `connector`.
    #[must_use]
    pub fn new(config: Arc<MountConfig>, connector: Arc<dyn LogConnector>) -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            connector,
            config,
        }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> DirectoryNode {
        DirectoryNode {
            registry: Arc::clone(&self.registry),
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
        }
    }
}

/// Either kind of node the host may address.
#[derive(Debug, Clone)]
pub enum Node {
    /// The root directory.
    Directory(DirectoryNode),
    /// A log-backed entry.
    File(FileNode),
}

impl Node {
    /// Current metadata for the node.
    #[must_use]
    pub fn attributes(&self) -> NodeAttr {
        match self {
            Self::Directory(dir) => dir.attributes(),
            Self::File(file) => file.attributes(),
        }
    }
}

/// The single flat directory of log entries.
#[derive(Clone)]
pub struct DirectoryNode {
    registry: Arc<ConnectionRegistry>,
    connector: Arc<dyn LogConnector>,
    config: Arc<MountConfig>,
}

impl std::fmt::Debug for DirectoryNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryNode")
            .field("entries", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl DirectoryNode {
    /// Directory metadata.
    #[must_use]
    pub fn attributes(&self) -> NodeAttr {
        let now = SystemTime::now();
        NodeAttr {
            kind: EntryKind::Directory,
            size: 0,
            permissions: DIRECTORY_PERMISSIONS,
            uid: self.config.owner.uid,
            gid: self.config.owner.gid,
            accessed: now,
            modified: now,
            changed: now,
            created: now,
        }
    }

    /// Resolve an existing entry. Never creates one.
    pub fn lookup(&self, name: &str) -> Result<FileNode, FsError> {
        let connection = self
            .registry
            .get(name)
            .ok_or_else(|| FsError::NotFound(name.to_owned()))?;
        Ok(FileNode {
            name: name.to_owned(),
            connection,
            config: Arc::clone(&self.config),
        })
    }

    /// Snapshot of the entry names. Call again to start over.
    #[must_use]
    pub fn list(&self) -> Listing {
        Listing {
            names: self.registry.names().into_iter(),
        }
    }

    /// Create (or reopen) an entry and return a handle open for writing.
    ///
    /// An existing name keeps the connection it was first created with, even
    /// if the new request would derive a different severity or label.
    pub fn create(&self, request: &CreateRequest) -> Result<Created, FsError> {
        match request.kind {
            EntryKind::Regular => {}
            EntryKind::Directory => return Err(FsError::IsDirectory(request.name.clone())),
            EntryKind::Other => return Err(FsError::UnsupportedKind(request.name.clone())),
        }
        let entry = EntryName::parse(&request.name)?;
        let connection = self.registry.get_or_try_insert_with(&entry.name, || {
            let connection = self.connector.connect(entry.severity, &entry.label)?;
            log::info!(
                "[fs] opened {} connection for '{}' as '{}'",
                entry.severity,
                entry.name,
                entry.label
            );
            Ok::<_, FsError>(connection)
        })?;
        let node = FileNode {
            name: entry.name,
            connection,
            config: Arc::clone(&self.config),
        };
        let handle = node.handle();
        Ok(Created {
            node,
            handle,
            flags: LOG_HANDLE_FLAGS,
        })
    }
}

/// Names in the directory at the time of listing.
#[derive(Debug)]
pub struct Listing {
    names: std::vec::IntoIter<String>,
}

impl Iterator for Listing {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.names.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.names.size_hint()
    }
}

impl ExactSizeIterator for Listing {}

/// A log-backed entry.
#[derive(Clone)]
pub struct FileNode {
    name: String,
    connection: Arc<dyn LogConnection>,
    config: Arc<MountConfig>,
}

impl std::fmt::Debug for FileNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileNode")
            .field("name", &self.name)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl FileNode {
    /// Entry name including its suffix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connection backing the entry.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn LogConnection> {
        &self.connection
    }

    /// Entry metadata; timestamps are taken fresh on every call.
    #[must_use]
    pub fn attributes(&self) -> NodeAttr {
        let now = SystemTime::now();
        NodeAttr {
            kind: EntryKind::Regular,
            size: 0,
            permissions: self.config.permissions,
            uid: self.config.owner.uid,
            gid: self.config.owner.gid,
            accessed: UNIX_EPOCH,
            modified: now,
            changed: now,
            created: now,
        }
    }

    /// Open the entry. Only write-only opens succeed.
    pub fn open(&self, request: OpenRequest) -> Result<Opened, FsError> {
        if request.directory {
            return Err(FsError::NotDirectory);
        }
        if request.access != AccessMode::WriteOnly {
            return Err(FsError::WriteOnly);
        }
        Ok(Opened {
            handle: self.handle(),
            flags: LOG_HANDLE_FLAGS,
        })
    }

    fn handle(&self) -> FileHandle {
        FileHandle {
            connection: Arc::clone(&self.connection),
        }
    }
}

/// Open session on an entry.
#[derive(Debug, Clone)]
pub struct FileHandle {
    connection: Arc<dyn LogConnection>,
}

impl FileHandle {
    /// Connection the handle writes to.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn LogConnection> {
        &self.connection
    }

    /// Forward `payload` as one message and report it fully accepted.
    ///
    /// Delivery failures are logged and otherwise ignored.
    pub fn write(&self, payload: &[u8]) -> usize {
        if let Err(err) = self.connection.send(payload) {
            log::warn!(
                "[fs] dropped {} byte message for '{}': {err}",
                payload.len(),
                self.connection.label()
            );
        }
        payload.len()
    }

    /// Entries are write-only; reads always fail.
    pub fn read(&self) -> Result<Vec<u8>, FsError> {
        Err(FsError::ReadUnsupported)
    }

    /// End the session. The connection stays registered.
    pub fn release(self) {}
}
