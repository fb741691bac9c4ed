// Filesystem interface abstraction
//
// Defines the operations the FUSE adapter needs from the overlay. The overlay
// is read-only: anything that would mutate the source library is rejected by
// the mount itself, so only lookup-style and read-style operations appear.

use crate::cache::CacheStats;
use crate::fs::PathError;
use crate::tag::TagError;
use chrono::{DateTime, Utc};

/// Result type for filesystem operations
pub type FsResult<T> = Result<T, FsError>;

/// Filesystem error types
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("Cannot synthesize tag: {0}")]
    Synthesis(String),

    #[error("Bad file handle: {0}")]
    BadHandle(u64),

    #[error("Read-only filesystem: {0}")]
    ReadOnly(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TagError> for FsError {
    fn from(err: TagError) -> Self {
        match err {
            TagError::PathFormat(e) => FsError::InvalidPath(e),
            TagError::Io(e) => FsError::Io(e),
            other @ TagError::Oversized { .. } => FsError::Synthesis(other.to_string()),
        }
    }
}

impl FsError {
    /// Convert to POSIX errno
    pub fn to_errno(&self) -> i32 {
        match self {
            FsError::InvalidPath(_) => libc::EINVAL,
            FsError::Synthesis(_) => libc::EINVAL,
            FsError::BadHandle(_) => libc::EBADF,
            FsError::ReadOnly(_) => libc::EROFS,
            FsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }
}

/// File type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    RegularFile,
    Directory,
    Symlink,
}

impl From<std::fs::FileType> for FileType {
    fn from(file_type: std::fs::FileType) -> Self {
        if file_type.is_dir() {
            FileType::Directory
        } else if file_type.is_symlink() {
            FileType::Symlink
        } else {
            FileType::RegularFile
        }
    }
}

/// File attributes structure
#[derive(Debug, Clone)]
pub struct FileAttr {
    pub inode: u64,
    pub kind: FileType,
    /// Apparent size: for tagged files this is the overlay length, not the
    /// length on disk.
    pub size: u64,
    pub atime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
    pub ctime: DateTime<Utc>,
    pub mode: u32, // Permission bits
    pub uid: u32,
    pub gid: u32,
    pub nlinks: u32,
}

/// Directory entry structure
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub inode: u64,
    pub name: String,
    pub kind: FileType,
}

/// Filesystem statistics
#[derive(Debug, Clone)]
pub struct StatFs {
    pub blocks: u64,  // Total blocks
    pub bfree: u64,   // Free blocks
    pub bavail: u64,  // Available blocks for unprivileged users
    pub files: u64,   // Total inodes
    pub ffree: u64,   // Free inodes
    pub bsize: u32,   // Block size
    pub namelen: u32, // Maximum filename length
    pub frsize: u32,  // Fragment size
}

/// Read-only filesystem interface served by the overlay.
///
/// Paths are mount-relative and start with `/`.
#[async_trait::async_trait]
pub trait FilesystemInterface: Send + Sync {
    async fn get_attr(&self, path: &str) -> FsResult<FileAttr>;
    async fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>>;

    /// Open the real file behind `path` and return a handle for `read`.
    async fn open(&self, path: &str, flags: i32) -> FsResult<u64>;
    async fn read(&self, path: &str, fh: u64, offset: u64, size: u32) -> FsResult<Vec<u8>>;
    async fn release(&self, fh: u64) -> FsResult<()>;

    /// Check `mask` (`R_OK`, `W_OK`, `X_OK`, `F_OK`) against the real file.
    async fn access(&self, path: &str, mask: i32) -> FsResult<()>;

    async fn statfs(&self) -> FsResult<StatFs>;

    /// Tag cache counters, when the implementation keeps a cache.
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}
