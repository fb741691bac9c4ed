// FUSE interface implementation
//
// Mounts the tagging overlay as a read-only POSIX filesystem.

pub mod adapter;
pub mod backend;
pub mod interface;
pub mod mount;

pub use adapter::FuseAdapter;
pub use backend::OverlayBackend;
pub use interface::{DirEntry, FileAttr, FileType, FilesystemInterface, FsError, FsResult, StatFs};
pub use mount::{MountOptions, build_backend, mount, mount_backend, unmount};
