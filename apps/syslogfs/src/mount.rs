// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Mount the log filesystem through FUSE and dispatch kernel requests to nodes.
// Author: Lukas Bower
#![forbid(unsafe_code)]

#[cfg(feature = "fuse")]
use std::collections::HashMap;
#[cfg(feature = "fuse")]
use std::ffi::OsStr;
use std::path::Path;
#[cfg(feature = "fuse")]
use std::time::{Duration, SystemTime};

#[cfg(not(feature = "fuse"))]
use anyhow::anyhow;
use anyhow::Result;
#[cfg(feature = "fuse")]
use anyhow::Context;

#[cfg(feature = "fuse")]
use crate::node::{
    AccessMode, CreateRequest, Created, EntryKind, FileHandle, FsError, Node, NodeAttr,
    OpenFlags, OpenRequest,
};
use crate::node::LogFilesystem;

#[cfg(feature = "fuse")]
const ROOT_INODE: u64 = 1;
#[cfg(feature = "fuse")]
const TTL: Duration = Duration::from_secs(1);

/// Mount `filesystem` at `at` and serve requests until it is unmounted.
pub fn mount(filesystem: LogFilesystem, at: &Path, fsname: &str) -> Result<()> {
    #[cfg(feature = "fuse")]
    {
        let options = [
            fuser::MountOption::FSName(fsname.to_owned()),
            fuser::MountOption::AutoUnmount,
        ];
        log::info!("[mount] serving {} at {}", fsname, at.display());
        fuser::mount2(SyslogFuse::new(filesystem), at, &options)
            .with_context(|| format!("mount {}", at.display()))?;
        Ok(())
    }
    #[cfg(not(feature = "fuse"))]
    {
        let _ = filesystem;
        let _ = fsname;
        Err(anyhow!(
            "fuse support disabled; rebuild syslogfs with --features fuse to mount {}",
            at.display()
        ))
    }
}

#[cfg(feature = "fuse")]
struct SyslogFuse {
    filesystem: LogFilesystem,
    inodes: InodeTable,
    handles: HashMap<u64, FileHandle>,
    listings: HashMap<u64, Vec<String>>,
    next_handle: u64,
}

/// One `readdir` entry: inode, offset of the following entry, type and name.
#[cfg(feature = "fuse")]
type DirectoryEntry = (u64, i64, fuser::FileType, String);

#[cfg(feature = "fuse")]
impl SyslogFuse {
    fn new(filesystem: LogFilesystem) -> Self {
        Self {
            filesystem,
            inodes: InodeTable::new(),
            handles: HashMap::new(),
            listings: HashMap::new(),
            next_handle: 1,
        }
    }

    fn allocate_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        handle
    }

    fn insert_handle(&mut self, handle: FileHandle) -> u64 {
        let fh = self.allocate_handle();
        self.handles.insert(fh, handle);
        fh
    }

    fn take_handle(&mut self, fh: u64) -> Result<FileHandle, i32> {
        self.handles.remove(&fh).ok_or(libc::EBADF)
    }

    fn node(&self, inode: u64) -> Result<Node, FsError> {
        let root = self.filesystem.root();
        if inode == ROOT_INODE {
            return Ok(Node::Directory(root));
        }
        let name = self
            .inodes
            .name_for(inode)
            .ok_or_else(|| FsError::NotFound(format!("inode {inode}")))?;
        root.lookup(name).map(Node::File)
    }

    fn attributes(&self, inode: u64) -> Result<fuser::FileAttr, FsError> {
        self.node(inode)
            .map(|node| file_attr(inode, &node.attributes()))
    }

    fn child_name<'a>(parent: u64, name: &'a OsStr) -> Result<&'a str, i32> {
        if parent != ROOT_INODE {
            return Err(libc::ENOENT);
        }
        name.to_str().ok_or(libc::EINVAL)
    }

    fn create_entry(
        &mut self,
        name: &str,
        kind: EntryKind,
    ) -> Result<(fuser::FileAttr, Created), FsError> {
        let request = CreateRequest {
            name: name.to_owned(),
            kind,
        };
        let created = self.filesystem.root().create(&request)?;
        let inode = self.inodes.insert(name);
        let attr = file_attr(inode, &created.node.attributes());
        Ok((attr, created))
    }

    /// Create without keeping a handle, as `mknod` and `mkdir` do.
    fn make_node(&mut self, name: &str, kind: EntryKind) -> Result<fuser::FileAttr, FsError> {
        let (attr, created) = self.create_entry(name, kind)?;
        created.handle.release();
        Ok(attr)
    }

    fn create_file(
        &mut self,
        name: &str,
        kind: EntryKind,
    ) -> Result<(fuser::FileAttr, u64, OpenFlags), FsError> {
        let (attr, created) = self.create_entry(name, kind)?;
        let fh = self.insert_handle(created.handle);
        Ok((attr, fh, created.flags))
    }

    fn open_file(&mut self, inode: u64, flags: i32) -> Result<(u64, OpenFlags), FsError> {
        let request = OpenRequest::file(AccessMode::from_flags(flags));
        let opened = match self.node(inode)? {
            Node::File(file) => file.open(request)?,
            Node::Directory(_) => return Err(FsError::IsDirectory("/".to_owned())),
        };
        let fh = self.insert_handle(opened.handle);
        Ok((fh, opened.flags))
    }

    fn read_handle(&self, fh: u64) -> Result<Vec<u8>, i32> {
        let handle = self.handles.get(&fh).ok_or(libc::EBADF)?;
        handle.read().map_err(|err| err.errno())
    }

    fn write_handle(&self, fh: u64, data: &[u8]) -> Result<usize, i32> {
        self.handles
            .get(&fh)
            .map(|handle| handle.write(data))
            .ok_or(libc::EBADF)
    }

    fn open_directory(&mut self, inode: u64, flags: i32) -> Result<u64, i32> {
        match self.node(inode).map_err(|err| err.errno())? {
            Node::Directory(dir) => {
                let fh = self.allocate_handle();
                self.listings.insert(fh, dir.list().collect());
                Ok(fh)
            }
            Node::File(file) => {
                let request = OpenRequest {
                    directory: true,
                    access: AccessMode::from_flags(flags),
                };
                match file.open(request) {
                    Ok(_) => Err(libc::ENOTDIR),
                    Err(err) => Err(err.errno()),
                }
            }
        }
    }

    fn read_directory(&mut self, fh: u64, offset: i64) -> Result<Vec<DirectoryEntry>, i32> {
        let names = self.listings.get(&fh).ok_or(libc::EBADF)?;
        let page = directory_page(names, offset);
        Ok(page
            .into_iter()
            .map(|(next, kind, name)| {
                let inode = match kind {
                    fuser::FileType::Directory => ROOT_INODE,
                    _ => self.inodes.insert(&name),
                };
                (inode, next, kind, name)
            })
            .collect())
    }
}

/// Entries of a listing snapshot starting at `offset`, led by `.` and `..`.
///
/// Each entry carries the offset to resume from after it.
#[cfg(feature = "fuse")]
fn directory_page(names: &[String], offset: i64) -> Vec<(i64, fuser::FileType, String)> {
    let dots = [".", ".."]
        .into_iter()
        .map(|name| (fuser::FileType::Directory, name.to_owned()));
    let files = names
        .iter()
        .map(|name| (fuser::FileType::RegularFile, name.clone()));
    let start = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
    dots.chain(files)
        .enumerate()
        .skip(start)
        .map(|(idx, (kind, name))| (i64::try_from(idx + 1).unwrap_or(i64::MAX), kind, name))
        .collect()
}

#[cfg(feature = "fuse")]
fn file_attr(inode: u64, attr: &NodeAttr) -> fuser::FileAttr {
    let is_dir = attr.kind == EntryKind::Directory;
    fuser::FileAttr {
        ino: inode,
        size: attr.size,
        blocks: 0,
        atime: attr.accessed,
        mtime: attr.modified,
        ctime: attr.changed,
        crtime: attr.created,
        kind: if is_dir {
            fuser::FileType::Directory
        } else {
            fuser::FileType::RegularFile
        },
        perm: attr.permissions,
        nlink: if is_dir { 2 } else { 1 },
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        flags: 0,
        blksize: 512,
    }
}

#[cfg(feature = "fuse")]
impl fuser::Filesystem for SyslogFuse {
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        log::debug!("[fuse] lookup parent={parent} name={name:?}");
        let name = match Self::child_name(parent, name) {
            Ok(name) => name,
            Err(_) => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        match self.filesystem.root().lookup(name) {
            Ok(node) => {
                let inode = self.inodes.insert(name);
                reply.entry(&TTL, &file_attr(inode, &node.attributes()), 0);
            }
            Err(err) => reply.error(err.errno()),
        }
    }

    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        log::debug!("[fuse] getattr inode={inode}");
        match self.attributes(inode) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    // Attributes are synthesised on every query; size and time updates
    // (for example the truncate behind `>` redirection) are accepted and ignored.
    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        log::debug!("[fuse] setattr inode={inode} size={size:?}");
        match self.attributes(inode) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: fuser::ReplyEntry,
    ) {
        log::debug!("[fuse] mknod parent={parent} name={name:?} mode={mode:o}");
        let name = match Self::child_name(parent, name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.make_node(name, EntryKind::from_mode(mode)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => {
                log::debug!("[fuse] mknod {name} rejected: {err}");
                reply.error(err.errno());
            }
        }
    }

    fn mkdir(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: fuser::ReplyEntry,
    ) {
        log::debug!("[fuse] mkdir parent={parent} name={name:?}");
        let name = match Self::child_name(parent, name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.make_node(name, EntryKind::from_mode(mode | libc::S_IFDIR as u32)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        log::debug!("[fuse] create parent={parent} name={name:?} mode={mode:o} flags={flags:#x}");
        let name = match Self::child_name(parent, name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.create_file(name, EntryKind::from_mode(mode)) {
            Ok((attr, fh, open_flags)) => reply.created(&TTL, &attr, 0, fh, open_flags.bits()),
            Err(err) => {
                log::warn!("[fuse] create {name} failed: {err}");
                reply.error(err.errno());
            }
        }
    }

    fn open(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        flags: i32,
        reply: fuser::ReplyOpen,
    ) {
        log::debug!("[fuse] open inode={inode} flags={flags:#x}");
        match self.open_file(inode, flags) {
            Ok((fh, open_flags)) => reply.opened(fh, open_flags.bits()),
            Err(err) => reply.error(err.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        fh: u64,
        _offset: i64,
        _size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        log::debug!("[fuse] read inode={inode} fh={fh}");
        match self.read_handle(fh) {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        }
    }

    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        log::debug!("[fuse] write inode={inode} fh={fh} len={}", data.len());
        match self.write_handle(fh, data) {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(errno) => reply.error(errno),
        }
    }

    fn flush(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        fh: u64,
        _lock_owner: u64,
        reply: fuser::ReplyEmpty,
    ) {
        log::debug!("[fuse] flush inode={inode} fh={fh}");
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        log::debug!("[fuse] release inode={inode} fh={fh}");
        match self.take_handle(fh) {
            Ok(handle) => {
                handle.release();
                reply.ok();
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn opendir(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        flags: i32,
        reply: fuser::ReplyOpen,
    ) {
        log::debug!("[fuse] opendir inode={inode}");
        match self.open_directory(inode, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        fh: u64,
        offset: i64,
        mut reply: fuser::ReplyDirectory,
    ) {
        log::debug!("[fuse] readdir inode={inode} fh={fh} offset={offset}");
        let entries = match self.read_directory(fh, offset) {
            Ok(entries) => entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        for (child, next, kind, name) in entries {
            if reply.add(child, next, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &fuser::Request<'_>,
        inode: u64,
        fh: u64,
        _flags: i32,
        reply: fuser::ReplyEmpty,
    ) {
        log::debug!("[fuse] releasedir inode={inode} fh={fh}");
        self.listings.remove(&fh);
        reply.ok();
    }
}

#[cfg(feature = "fuse")]
#[derive(Debug, Default)]
struct InodeTable {
    by_inode: HashMap<u64, String>,
    by_name: HashMap<String, u64>,
    next_inode: u64,
}

#[cfg(feature = "fuse")]
impl InodeTable {
    fn new() -> Self {
        Self {
            by_inode: HashMap::new(),
            by_name: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        }
    }

    fn insert(&mut self, name: &str) -> u64 {
        if let Some(existing) = self.by_name.get(name) {
            return *existing;
        }
        let inode = self.next_inode;
        self.next_inode = self.next_inode.saturating_add(1);
        self.by_inode.insert(inode, name.to_owned());
        self.by_name.insert(name.to_owned(), inode);
        inode
    }

    fn name_for(&self, inode: u64) -> Option<&str> {
        self.by_inode.get(&inode).map(String::as_str)
    }
}

#[cfg(all(test, feature = "fuse"))]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use syslog_wire::{Facility, Severity};

    use crate::config::{MountConfig, Owner};
    use crate::node::LOG_HANDLE_FLAGS;
    use crate::sink::{LogConnection, LogConnector, SinkAddress, SinkError};

    #[derive(Debug)]
    struct Captured {
        severity: Severity,
        label: String,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl LogConnection for Captured {
        fn severity(&self) -> Severity {
            self.severity
        }

        fn label(&self) -> &str {
            &self.label
        }

        fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
            self.sent.lock().expect("sent lock").push(payload.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Capture {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl LogConnector for Capture {
        fn connect(
            &self,
            severity: Severity,
            label: &str,
        ) -> Result<Arc<dyn LogConnection>, SinkError> {
            Ok(Arc::new(Captured {
                severity,
                label: label.to_owned(),
                sent: Arc::clone(&self.sent),
            }))
        }
    }

    fn fuse_with(connector: Arc<Capture>) -> SyslogFuse {
        let config = Arc::new(MountConfig::new(
            SinkAddress::Local,
            Facility::Daemon,
            0o200,
            Owner { uid: 7, gid: 8 },
        ));
        SyslogFuse::new(LogFilesystem::new(config, connector))
    }

    fn fuse() -> SyslogFuse {
        fuse_with(Arc::new(Capture::default()))
    }

    fn names(entries: &[(i64, fuser::FileType, String)]) -> Vec<&str> {
        entries.iter().map(|(_, _, name)| name.as_str()).collect()
    }

    fn regular_mode() -> u32 {
        libc::S_IFREG as u32 | 0o644
    }

    #[test]
    fn inode_numbers_are_stable_per_name() {
        let mut table = InodeTable::new();
        let first = table.insert("app.stdout");
        let second = table.insert("app.stderr");
        assert_eq!(first, ROOT_INODE + 1);
        assert_ne!(first, second);
        assert_eq!(table.insert("app.stdout"), first);
        assert_eq!(table.name_for(second), Some("app.stderr"));
        assert_eq!(table.name_for(ROOT_INODE), None);
    }

    #[test]
    fn attributes_translate_to_fuse_kinds() {
        let now = SystemTime::now();
        let attr = NodeAttr {
            kind: EntryKind::Regular,
            size: 0,
            permissions: 0o200,
            uid: 7,
            gid: 8,
            accessed: now,
            modified: now,
            changed: now,
            created: now,
        };
        let fuse = file_attr(5, &attr);
        assert_eq!(fuse.ino, 5);
        assert_eq!(fuse.kind, fuser::FileType::RegularFile);
        assert_eq!(fuse.perm, 0o200);
        assert_eq!((fuse.uid, fuse.gid), (7, 8));
        let dir = file_attr(ROOT_INODE, &NodeAttr {
            kind: EntryKind::Directory,
            permissions: 0o755,
            ..attr
        });
        assert_eq!(dir.kind, fuser::FileType::Directory);
        assert_eq!(dir.nlink, 2);
    }

    #[test]
    fn directory_pages_resume_from_offset() {
        let snapshot = vec!["a.stdout".to_owned(), "b.stdout".to_owned(), "c.stderr".to_owned()];

        let full = directory_page(&snapshot, 0);
        assert_eq!(names(&full), [".", "..", "a.stdout", "b.stdout", "c.stderr"]);
        let offsets: Vec<i64> = full.iter().map(|(next, _, _)| *next).collect();
        assert_eq!(offsets, [1, 2, 3, 4, 5]);
        assert_eq!(full[0].1, fuser::FileType::Directory);
        assert_eq!(full[2].1, fuser::FileType::RegularFile);

        let rest = directory_page(&snapshot, 3);
        assert_eq!(names(&rest), ["b.stdout", "c.stderr"]);
        assert_eq!(rest[0].0, 4);

        assert!(directory_page(&snapshot, 5).is_empty());
        assert!(directory_page(&snapshot, 500).is_empty());
        assert_eq!(directory_page(&snapshot, -1).len(), 5);
    }

    #[test]
    fn listing_snapshot_ignores_later_creates() {
        let mut fs = fuse();
        fs.make_node("a.stdout", EntryKind::Regular).expect("a");
        fs.make_node("b.stderr", EntryKind::Regular).expect("b");
        let fh = fs.open_directory(ROOT_INODE, libc::O_RDONLY).expect("opendir");

        let first = fs.read_directory(fh, 0).expect("first page");
        let (_, resume, _, _) = first[2].clone();
        fs.make_node("c.stdout", EntryKind::Regular).expect("c");
        let second = fs.read_directory(fh, resume).expect("second page");

        let mut seen: Vec<String> = first[..3]
            .iter()
            .chain(second.iter())
            .map(|(_, _, _, name)| name.clone())
            .collect();
        seen.sort();
        assert_eq!(seen, [".", "..", "a.stdout", "b.stderr"]);
        assert!(first
            .iter()
            .filter(|(_, _, kind, _)| *kind == fuser::FileType::RegularFile)
            .all(|(inode, _, _, _)| *inode > ROOT_INODE));

        let fresh = fs.open_directory(ROOT_INODE, libc::O_RDONLY).expect("reopen");
        let listed: HashSet<String> = fs
            .read_directory(fresh, 2)
            .expect("fresh page")
            .into_iter()
            .map(|(_, _, _, name)| name)
            .collect();
        assert_eq!(listed.len(), 3);
        assert!(listed.contains("c.stdout"));
        assert_eq!(fs.read_directory(999, 0), Err(libc::EBADF));
    }

    #[test]
    fn opendir_on_a_file_is_not_a_directory() {
        let mut fs = fuse();
        let attr = fs.make_node("app.stdout", EntryKind::Regular).expect("create");
        assert_eq!(fs.open_directory(attr.ino, libc::O_RDONLY), Err(libc::ENOTDIR));
        assert_eq!(fs.open_directory(4242, libc::O_RDONLY), Err(libc::ENOENT));
    }

    #[test]
    fn setattr_truncation_reports_current_attributes() {
        let mut fs = fuse();
        let (attr, _, _) = fs
            .create_file("app.stdout", EntryKind::from_mode(regular_mode()))
            .expect("create");
        let after = fs.attributes(attr.ino).expect("setattr");
        assert_eq!(after.ino, attr.ino);
        assert_eq!(after.size, 0);
        assert_eq!(after.perm, 0o200);
        assert_eq!(after.kind, fuser::FileType::RegularFile);
        let root = fs.attributes(ROOT_INODE).expect("root");
        assert_eq!(root.kind, fuser::FileType::Directory);
        assert_eq!(root.perm, 0o755);
        assert!(matches!(fs.attributes(77), Err(FsError::NotFound(_))));
    }

    #[test]
    fn mkdir_is_rejected_as_a_directory() {
        let mut fs = fuse();
        let err = fs
            .make_node("logs.stdout", EntryKind::from_mode(0o755 | libc::S_IFDIR as u32))
            .expect_err("mkdir");
        assert_eq!(err.errno(), libc::EISDIR);
        let fifo = fs
            .make_node("pipe.stdout", EntryKind::from_mode(libc::S_IFIFO as u32 | 0o600))
            .expect_err("mkfifo");
        assert_eq!(fifo.errno(), libc::EINVAL);
        let fh = fs.open_directory(ROOT_INODE, libc::O_RDONLY).expect("opendir");
        assert_eq!(fs.read_directory(fh, 0).expect("listing").len(), 2);
    }

    #[test]
    fn open_accepts_only_write_intent() {
        let mut fs = fuse();
        let attr = fs.make_node("app.stderr", EntryKind::Regular).expect("mknod");
        for flags in [libc::O_RDONLY, libc::O_RDWR, libc::O_RDWR | libc::O_APPEND] {
            let err = fs.open_file(attr.ino, flags).expect_err("read intent");
            assert_eq!(err.errno(), libc::EACCES);
        }
        let (fh, flags) = fs
            .open_file(attr.ino, libc::O_WRONLY | libc::O_TRUNC)
            .expect("write intent");
        assert_eq!(flags, LOG_HANDLE_FLAGS);
        assert!(fs.handles.contains_key(&fh));
        let root = fs.open_file(ROOT_INODE, libc::O_WRONLY).expect_err("root");
        assert_eq!(root.errno(), libc::EISDIR);
    }

    #[test]
    fn handles_forward_writes_until_released() {
        let capture = Arc::new(Capture::default());
        let mut fs = fuse_with(Arc::clone(&capture));
        let (_, fh, flags) = fs
            .create_file("app.stdout", EntryKind::Regular)
            .expect("create");
        assert_eq!(flags, LOG_HANDLE_FLAGS);
        assert_eq!(fs.write_handle(fh, b"hello world\n"), Ok(12));
        assert_eq!(fs.read_handle(fh), Err(libc::EBADF));
        assert_eq!(
            capture.sent.lock().expect("sent lock").as_slice(),
            [b"hello world\n".to_vec()]
        );

        fs.take_handle(fh).expect("release").release();
        assert_eq!(fs.write_handle(fh, b"late"), Err(libc::EBADF));
        assert!(fs.take_handle(fh).is_err());
        assert_eq!(fs.read_handle(fh), Err(libc::EBADF));
        assert!(fs.filesystem.root().lookup("app.stdout").is_ok());
    }

    #[test]
    fn handle_numbers_are_never_zero() {
        let mut fs = fuse();
        fs.next_handle = u64::MAX;
        assert_eq!(fs.allocate_handle(), u64::MAX);
        assert_eq!(fs.allocate_handle(), 1);
    }
}
