// FUSE adapter - bridges sync FUSE callbacks to async FilesystemInterface
//
// This adapter implements the fuser::Filesystem trait and delegates all operations
// to the async FilesystemInterface implementation. It handles:
// - Async to sync conversion using a dedicated tokio runtime
// - Inode to path mapping
// - FUSE types to FilesystemInterface types conversion
// - Error code translation
//
// The mount is read-only, so only lookup, attribute, directory, open/read/release,
// access and statfs callbacks are implemented. fuser answers everything else with
// ENOSYS, and the kernel rejects writes on the RO mount before they reach us.
//
// IMPORTANT: The adapter uses its own dedicated runtime. FUSE callbacks are
// synchronous; calling block_on() on the caller's runtime from inside that
// runtime would deadlock.

use super::interface::{FileAttr, FileType, FilesystemInterface, FsError};
use crate::fs::join_virtual;
use fuser::{
    FileType as FuseFileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::io;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Runtime;

const ROOT_INODE: u64 = 1;

/// Default TTL for file attributes (1 second)
const ATTR_TTL: Duration = Duration::from_secs(1);

/// Default TTL for directory entries (1 second)
const ENTRY_TTL: Duration = Duration::from_secs(1);

/// FUSE adapter that bridges sync FUSE callbacks to async FilesystemInterface
pub struct FuseAdapter {
    backend: Arc<dyn FilesystemInterface>,

    /// Dedicated tokio runtime for async operations
    runtime: Arc<Runtime>,

    /// FUSE speaks inodes, the backend speaks mount-relative paths
    inode_map: Arc<RwLock<InodeMap>>,
}

/// Manages inode <-> path bidirectional mapping
///
/// Only `lookup` allocates inodes, and each allocation is counted so the
/// kernel's `forget` can drop the mapping once it holds no references.
struct InodeMap {
    inode_to_path: HashMap<u64, String>,
    path_to_inode: HashMap<String, u64>,
    lookups: HashMap<u64, u64>,
    next_inode: u64,
}

impl InodeMap {
    fn new() -> Self {
        let mut map = Self {
            inode_to_path: HashMap::new(),
            path_to_inode: HashMap::new(),
            lookups: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        map.insert(ROOT_INODE, "/".to_string());
        map
    }

    fn insert(&mut self, inode: u64, path: String) {
        self.inode_to_path.insert(inode, path.clone());
        self.path_to_inode.insert(path, inode);
    }

    fn get_or_create(&mut self, path: &str) -> u64 {
        if let Some(&inode) = self.path_to_inode.get(path) {
            return inode;
        }

        let inode = self.next_inode;
        self.next_inode += 1;
        self.insert(inode, path.to_string());
        inode
    }

    /// Inode for `path`, counting one kernel reference to it.
    fn lookup(&mut self, path: &str) -> u64 {
        let inode = self.get_or_create(path);
        if inode != ROOT_INODE {
            *self.lookups.entry(inode).or_default() += 1;
        }
        inode
    }

    /// Drop `nlookup` kernel references; the mapping goes with the last one.
    fn forget(&mut self, inode: u64, nlookup: u64) {
        let Some(count) = self.lookups.get_mut(&inode) else {
            return;
        };
        *count = count.saturating_sub(nlookup);
        if *count == 0 {
            self.lookups.remove(&inode);
            if let Some(path) = self.inode_to_path.remove(&inode) {
                self.path_to_inode.remove(&path);
            }
        }
    }

    fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).copied()
    }

    fn get_path(&self, inode: u64) -> Option<&str> {
        self.inode_to_path.get(&inode).map(|s| s.as_str())
    }

    fn len(&self) -> usize {
        self.inode_to_path.len()
    }
}

/// Parent of a mount-relative path; the root is its own parent.
fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

impl FuseAdapter {
    /// Create a new FUSE adapter with a dedicated runtime
    pub fn new(backend: Arc<dyn FilesystemInterface>) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .thread_name("autotagfs-fuse")
            .enable_all()
            .build()?;

        Ok(Self::with_runtime(backend, Arc::new(runtime)))
    }

    /// Create a new FUSE adapter with a provided runtime
    ///
    /// The runtime must not be the one the caller is running on.
    pub fn with_runtime(backend: Arc<dyn FilesystemInterface>, runtime: Arc<Runtime>) -> Self {
        Self { backend, runtime, inode_map: Arc::new(RwLock::new(InodeMap::new())) }
    }

    fn get_path(&self, inode: u64) -> Result<String, libc::c_int> {
        let map = self.inode_map.read().unwrap_or_else(PoisonError::into_inner);
        map.get_path(inode).map(|s| s.to_string()).ok_or(libc::ENOENT)
    }

    fn inode_map(&self) -> RwLockWriteGuard<'_, InodeMap> {
        self.inode_map.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, libc::c_int> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        let parent_path = self.get_path(parent)?;
        Ok(join_virtual(&parent_path, name))
    }

    fn block_on<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        self.runtime.block_on(future)
    }

    fn error_to_errno(op: &str, path: &str, error: FsError) -> libc::c_int {
        let errno = error.to_errno();
        match errno {
            libc::ENOENT => tracing::trace!(op, path, "No such entry"),
            libc::EINVAL => tracing::warn!(op, path, error = %error, "Rejected path"),
            _ => tracing::debug!(op, path, error = %error, errno, "Operation failed"),
        }
        errno
    }

    fn to_fuse_attr(attr: &FileAttr) -> fuser::FileAttr {
        fuser::FileAttr {
            ino: attr.inode,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: SystemTime::from(attr.atime),
            mtime: SystemTime::from(attr.mtime),
            ctime: SystemTime::from(attr.ctime),
            crtime: UNIX_EPOCH,
            kind: to_fuse_kind(attr.kind),
            perm: attr.mode as u16,
            nlink: attr.nlinks,
            uid: attr.uid,
            gid: attr.gid,
            rdev: 0,
            blksize: 4096,
            flags: 0,
        }
    }

    fn attr_for(&self, ino: u64, path: &str) -> Result<fuser::FileAttr, libc::c_int> {
        let mut attr = self
            .block_on(self.backend.get_attr(path))
            .map_err(|e| Self::error_to_errno("getattr", path, e))?;
        attr.inode = ino;
        Ok(Self::to_fuse_attr(&attr))
    }

    fn lookup_child(&self, parent: u64, name: &OsStr) -> Result<fuser::FileAttr, libc::c_int> {
        let path = self.child_path(parent, name)?;
        let mut attr = self
            .block_on(self.backend.get_attr(&path))
            .map_err(|e| Self::error_to_errno("lookup", &path, e))?;
        attr.inode = self.inode_map().lookup(&path);
        Ok(Self::to_fuse_attr(&attr))
    }

    /// `.` and `..` followed by the backend's entries.
    ///
    /// Children already known to the kernel report their mapped inode; the
    /// rest report the source inode, which the kernel only uses as `d_ino`.
    fn dir_entries(&self, ino: u64) -> Result<Vec<(u64, FuseFileType, String)>, libc::c_int> {
        let path = self.get_path(ino)?;
        let entries = self
            .block_on(self.backend.read_dir(&path))
            .map_err(|e| Self::error_to_errno("readdir", &path, e))?;

        let map = self.inode_map.read().unwrap_or_else(PoisonError::into_inner);
        let parent = map.get_inode(parent_path(&path)).unwrap_or(ino);
        let mut all_entries = vec![
            (ino, FuseFileType::Directory, ".".to_string()),
            (parent, FuseFileType::Directory, "..".to_string()),
        ];

        for entry in entries {
            let inode = map.get_inode(&join_virtual(&path, &entry.name)).unwrap_or(entry.inode);
            all_entries.push((inode, to_fuse_kind(entry.kind), entry.name));
        }

        Ok(all_entries)
    }

    fn open_path(&self, ino: u64, flags: i32) -> Result<u64, libc::c_int> {
        let path = self.get_path(ino)?;
        self.block_on(self.backend.open(&path, flags))
            .map_err(|e| Self::error_to_errno("open", &path, e))
    }

    fn read_data(&self, ino: u64, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>, libc::c_int> {
        let path = self.get_path(ino)?;
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        self.block_on(self.backend.read(&path, fh, offset, size))
            .map_err(|e| Self::error_to_errno("read", &path, e))
    }
}

fn to_fuse_kind(kind: FileType) -> FuseFileType {
    match kind {
        FileType::RegularFile => FuseFileType::RegularFile,
        FileType::Directory => FuseFileType::Directory,
        FileType::Symlink => FuseFileType::Symlink,
    }
}

impl Filesystem for FuseAdapter {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        tracing::info!("FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        match self.backend.cache_stats() {
            Some(stats) => tracing::info!(
                entries = stats.entries,
                hits = stats.hits,
                misses = stats.misses,
                refreshes = stats.refreshes,
                evictions = stats.evictions,
                "FUSE filesystem destroyed"
            ),
            None => tracing::info!("FUSE filesystem destroyed"),
        }
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_child(parent, name) {
            Ok(attr) => reply.entry(&ENTRY_TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        let mut map = self.inode_map();
        map.forget(ino, nlookup);
        tracing::trace!(ino, nlookup, mapped = map.len(), "Forgot inode");
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let result = self.get_path(ino).and_then(|path| self.attr_for(ino, &path));
        match result {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.dir_entries(ino) {
            Ok(entries) => entries,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        for (i, (inode, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            let buffer_full = reply.add(*inode, (i + 1) as i64, *kind, name);
            if buffer_full {
                break;
            }
        }

        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_path(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_data(ino, fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(errno) => reply.error(errno),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.block_on(self.backend.release(fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::error_to_errno("release", "", e)),
        }
    }

    fn access(&mut self, _req: &Request, ino: u64, mask: i32, reply: ReplyEmpty) {
        let result = self.get_path(ino).and_then(|path| {
            self.block_on(self.backend.access(&path, mask))
                .map_err(|e| Self::error_to_errno("access", &path, e))
        });
        match result {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        match self.block_on(self.backend.statfs()) {
            Ok(stats) => reply.statfs(
                stats.blocks,
                stats.bfree,
                stats.bavail,
                stats.files,
                stats.ffree,
                stats.bsize,
                stats.namelen,
                stats.frsize,
            ),
            Err(e) => reply.error(Self::error_to_errno("statfs", "/", e)),
        }
    }
}
