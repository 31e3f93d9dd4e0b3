// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Expose the syslogfs filesystem core, sink adapter and mount helpers.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! A write-only filesystem whose files are syslog connections.
//!
//! Creating `<label>.stdout` or `<label>.stderr` under the mount point opens
//! a persistent connection to the log sink tagged with `<label>` and an
//! informational or error severity. Every write to the file becomes one log
//! message.

/// Startup configuration.
pub mod config;
/// FUSE host adapter.
pub mod mount;
/// Directory, file and handle nodes.
pub mod node;
/// Append-only connection table.
pub mod registry;
/// Log sink connections.
pub mod sink;

pub use config::MountConfig;
pub use node::{DirectoryNode, FileHandle, FileNode, FsError, LogFilesystem, Node};
pub use registry::ConnectionRegistry;
pub use sink::{LogConnection, LogConnector, SinkAddress, SyslogConnector};
