// OverlayBackend - serves the source library with synthesized tags
//
// The backend is the per-mount context: it owns the tag cache, the open-file
// table and the source root. Every operation runs its blocking filesystem work
// on tokio's blocking pool.

use super::interface::*;
use crate::cache::{CacheStats, EntryCache};
use crate::config::{CacheConfig, TagConfig};
use crate::fs::real_path;
use crate::splice::{PayloadSource, splice_read, virtual_size};
use chrono::{DateTime, Utc};
use nix::unistd::AccessFlags;
use std::collections::HashMap;
use std::fs::{File, Metadata};
use std::io;
use std::os::unix::fs::{DirEntryExt, MetadataExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Clone)]
pub struct OverlayBackend {
    overlay: Arc<Overlay>,
}

struct Overlay {
    root: PathBuf,
    tag: TagConfig,
    cache: EntryCache,
    handles: RwLock<HashMap<u64, Arc<File>>>,
    next_fh: AtomicU64,
}

impl OverlayBackend {
    /// `root` should be canonical: cache keys and path parsing are relative to it.
    pub fn new(root: impl Into<PathBuf>, cache: &CacheConfig, tag: TagConfig) -> Self {
        let root = root.into();
        let entries = EntryCache::new(root.clone(), cache.max_entries, tag.layout);
        Self {
            overlay: Arc::new(Overlay {
                root,
                tag,
                cache: entries,
                handles: RwLock::new(HashMap::new()),
                next_fh: AtomicU64::new(1),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.overlay.root
    }

    pub fn cache(&self) -> &EntryCache {
        &self.overlay.cache
    }

    async fn blocking<T, F>(&self, op: F) -> FsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Overlay) -> FsResult<T> + Send + 'static,
    {
        let overlay = self.overlay.clone();
        tokio::task::spawn_blocking(move || op(&overlay)).await.map_err(|e| FsError::Io(io::Error::other(e)))?
    }
}

impl Overlay {
    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        Ok(real_path(&self.root, path)?)
    }

    fn is_tagged(&self, real: &Path, metadata: &Metadata) -> bool {
        metadata.is_file() && self.tag.is_tagged(real)
    }

    fn get_attr(&self, path: &str) -> FsResult<FileAttr> {
        let real = self.resolve(path)?;
        let metadata = std::fs::metadata(&real)?;

        let size = if self.is_tagged(&real, &metadata) {
            let entry = self.cache.lookup(&real)?;
            virtual_size(metadata.len(), &entry)
        } else {
            metadata.len()
        };

        Ok(FileAttr {
            inode: metadata.ino(),
            kind: metadata.file_type().into(),
            size,
            atime: timestamp(metadata.atime(), metadata.atime_nsec()),
            mtime: timestamp(metadata.mtime(), metadata.mtime_nsec()),
            ctime: timestamp(metadata.ctime(), metadata.ctime_nsec()),
            mode: metadata.mode() & 0o7777,
            uid: metadata.uid(),
            gid: metadata.gid(),
            nlinks: metadata.nlink() as u32,
        })
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let real = self.resolve(path)?;
        let mut entries = Vec::new();

        for item in std::fs::read_dir(&real)? {
            let item = item?;
            let name = match item.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::warn!(dir = %real.display(), name = ?raw, "Skipping non UTF-8 entry");
                    continue;
                }
            };
            // symlinks are presented as what they point to
            let kind = match std::fs::metadata(item.path()) {
                Ok(metadata) => metadata.file_type().into(),
                Err(_) => item.file_type()?.into(),
            };
            entries.push(DirEntry { inode: item.ino(), name, kind });
        }

        Ok(entries)
    }

    fn open(&self, path: &str, flags: i32) -> FsResult<u64> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(FsError::ReadOnly(path.to_string()));
        }

        let real = self.resolve(path)?;
        let file = File::open(&real)?;
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.write().unwrap_or_else(PoisonError::into_inner).insert(fh, Arc::new(file));
        Ok(fh)
    }

    fn handle(&self, fh: u64) -> FsResult<Arc<File>> {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&fh)
            .cloned()
            .ok_or(FsError::BadHandle(fh))
    }

    fn read(&self, path: &str, fh: u64, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let file = self.handle(fh)?;
        let real = self.resolve(path)?;

        if self.is_tagged(&real, &file.metadata()?) {
            let entry = self.cache.lookup(&real)?;
            Ok(splice_read(&entry, offset, size, file.as_ref())?)
        } else {
            Ok(file.read_real(offset, size as usize)?)
        }
    }

    fn release(&self, fh: u64) -> FsResult<()> {
        self.handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&fh)
            .map(|_| ())
            .ok_or(FsError::BadHandle(fh))
    }

    fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        if mask & libc::W_OK != 0 {
            return Err(FsError::ReadOnly(path.to_string()));
        }
        let real = self.resolve(path)?;
        nix::unistd::access(&real, AccessFlags::from_bits_truncate(mask))
            .map_err(|errno| FsError::Io(errno.into()))
    }

    fn statfs(&self) -> FsResult<StatFs> {
        let stats = nix::sys::statvfs::statvfs(&self.root).map_err(io::Error::from)?;
        Ok(StatFs {
            blocks: stats.blocks() as u64,
            bfree: stats.blocks_free() as u64,
            bavail: stats.blocks_available() as u64,
            files: stats.files() as u64,
            ffree: stats.files_free() as u64,
            bsize: stats.block_size() as u32,
            namelen: stats.name_max() as u32,
            frsize: stats.fragment_size() as u32,
        })
    }
}

fn timestamp(secs: i64, nsecs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, nsecs as u32).unwrap_or_default()
}

#[async_trait::async_trait]
impl FilesystemInterface for OverlayBackend {
    async fn get_attr(&self, path: &str) -> FsResult<FileAttr> {
        let path = path.to_string();
        self.blocking(move |overlay| overlay.get_attr(&path)).await
    }

    async fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let path = path.to_string();
        self.blocking(move |overlay| overlay.read_dir(&path)).await
    }

    async fn open(&self, path: &str, flags: i32) -> FsResult<u64> {
        let path = path.to_string();
        self.blocking(move |overlay| overlay.open(&path, flags)).await
    }

    async fn read(&self, path: &str, fh: u64, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let path = path.to_string();
        self.blocking(move |overlay| overlay.read(&path, fh, offset, size)).await
    }

    async fn release(&self, fh: u64) -> FsResult<()> {
        self.blocking(move |overlay| overlay.release(fh)).await
    }

    async fn access(&self, path: &str, mask: i32) -> FsResult<()> {
        let path = path.to_string();
        self.blocking(move |overlay| overlay.access(&path, mask)).await
    }

    async fn statfs(&self) -> FsResult<StatFs> {
        self.blocking(|overlay| overlay.statfs()).await
    }

    fn cache_stats(&self) -> Option<CacheStats> {
        Some(self.overlay.cache.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(root: &Path) -> OverlayBackend {
        OverlayBackend::new(root, &CacheConfig::default(), TagConfig::default())
    }

    #[test]
    fn test_timestamp_conversion() {
        let dt = timestamp(1_700_000_000, 500);
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_nanos(), 500);
    }

    #[test]
    fn test_open_rejects_write_access() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), b"x").unwrap();
        let backend = backend(dir.path());

        let err = backend.overlay.open("/f.txt", libc::O_RDWR).unwrap_err();
        assert_eq!(err.to_errno(), libc::EROFS);
        assert!(backend.overlay.open("/f.txt", libc::O_RDONLY).is_ok());
    }

    #[test]
    fn test_release_unknown_handle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        assert!(matches!(backend.overlay.release(99), Err(FsError::BadHandle(99))));
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend(dir.path());
        let err = backend.overlay.resolve("/../etc/passwd").unwrap_err();
        assert_eq!(err.to_errno(), libc::EINVAL);
    }
}
