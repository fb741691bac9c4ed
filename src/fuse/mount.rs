// FUSE mount management
//
// Provides functions to mount and unmount the tagging overlay via FUSE.

use super::{FuseAdapter, OverlayBackend};
use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

/// Mount options for FUSE filesystem
#[derive(Debug, Clone)]
pub struct MountOptions {
    /// Allow other users to access the filesystem
    pub allow_other: bool,

    /// Allow root to access the filesystem
    pub allow_root: bool,

    /// Mount as read-only
    pub read_only: bool,

    /// Filesystem name (for mtab)
    pub fsname: Option<String>,

    /// Auto-unmount on process exit
    pub auto_unmount: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            allow_other: false,
            allow_root: false,
            read_only: true,
            fsname: Some("autotagfs".to_string()),
            auto_unmount: true,
        }
    }
}

impl MountOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allow_other: config.fuse.allow_other,
            allow_root: config.fuse.allow_root,
            auto_unmount: config.fuse.auto_unmount,
            ..Default::default()
        }
    }

    /// Convert to fuser mount options
    fn to_fuser_options(&self) -> Vec<fuser::MountOption> {
        let mut options = Vec::new();

        if self.allow_other {
            options.push(fuser::MountOption::AllowOther);
        }

        if self.allow_root {
            options.push(fuser::MountOption::AllowRoot);
        }

        if self.read_only {
            options.push(fuser::MountOption::RO);
        }

        if let Some(ref fsname) = self.fsname {
            options.push(fuser::MountOption::FSName(fsname.clone()));
        }

        if self.auto_unmount {
            options.push(fuser::MountOption::AutoUnmount);
        }

        options
    }
}

/// Build the overlay backend for `config.source`.
pub fn build_backend(config: &Config) -> Result<OverlayBackend> {
    let source = Path::new(&config.source);
    let root = source
        .canonicalize()
        .with_context(|| format!("Source directory not accessible: {}", source.display()))?;

    if !root.is_dir() {
        anyhow::bail!("Source is not a directory: {}", root.display());
    }

    Ok(OverlayBackend::new(root, &config.cache, config.tag.clone()))
}

/// Mount the overlay at `config.fuse.mount_point`
///
/// Returns a session handle that keeps the filesystem mounted until dropped.
pub fn mount(config: &Config) -> Result<fuser::BackgroundSession> {
    let backend = build_backend(config)?;
    mount_backend(backend, &config.fuse.mount_point, MountOptions::from_config(config))
}

/// Mount an already built backend
pub fn mount_backend(
    backend: OverlayBackend,
    mountpoint: impl AsRef<Path>,
    options: MountOptions,
) -> Result<fuser::BackgroundSession> {
    let mountpoint = mountpoint.as_ref();

    if !mountpoint.exists() {
        anyhow::bail!("Mount point does not exist: {}", mountpoint.display());
    }

    if !mountpoint.is_dir() {
        anyhow::bail!("Mount point is not a directory: {}", mountpoint.display());
    }

    if options.allow_other && options.allow_root {
        anyhow::bail!("allow_other and allow_root are mutually exclusive");
    }

    tracing::info!(
        source = %backend.root().display(),
        mountpoint = %mountpoint.display(),
        layout = %backend.cache().layout(),
        "Mounting autotagfs"
    );

    let adapter = FuseAdapter::new(Arc::new(backend)).context("Failed to create FUSE runtime")?;
    let session = fuser::spawn_mount2(adapter, mountpoint, &options.to_fuser_options())
        .context("Failed to mount filesystem")?;

    tracing::info!("Filesystem mounted successfully");

    Ok(session)
}

/// Unmount a FUSE filesystem
///
/// Dropping the BackgroundSession unmounts as well; this is for mounts left
/// behind by a crashed process (`autotagfs --unmount`).
pub fn unmount(mountpoint: impl AsRef<Path>) -> Result<()> {
    let mountpoint = mountpoint.as_ref();

    tracing::info!("Unmounting filesystem at {}", mountpoint.display());

    #[cfg(target_os = "linux")]
    {
        use std::process::Command;

        let output = Command::new("fusermount")
            .arg("-u")
            .arg(mountpoint)
            .output()
            .context("Failed to execute fusermount")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to unmount: {}", stderr);
        }
    }

    #[cfg(target_os = "macos")]
    {
        use std::process::Command;

        let output =
            Command::new("umount").arg(mountpoint).output().context("Failed to execute umount")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to unmount: {}", stderr);
        }
    }

    tracing::info!("Filesystem unmounted successfully");

    Ok(())
}
