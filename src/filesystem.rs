//! Server data directory: disk accounting and ownership.
//!
//! The power controller only needs three things from storage: a cheap
//! fire-and-forget usage refresh, a blocking limit check, and a permission
//! fix-up over the data directory. [`LocalFilesystem`] implements them over a
//! plain directory on local disk.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

const MIB: i64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum FilesystemError {
    #[error("not enough disk space: {used} of {limit} bytes used")]
    DiskSpaceExceeded { used: u64, limit: u64 },

    #[error("filesystem I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FilesystemError {
    pub fn is_disk_space(&self) -> bool {
        matches!(self, FilesystemError::DiskSpaceExceeded { .. })
    }
}

/// Storage operations the daemon needs for a single server.
#[async_trait]
pub trait Filesystem: Send + Sync + 'static {
    /// Root of the server's data directory.
    fn path(&self) -> PathBuf;

    /// Sets the disk limit in MiB. Zero or less means unlimited.
    fn set_disk_limit(&self, limit_mib: i64);

    /// Refreshes usage (always when `force`) and reports whether the server is
    /// within its limit. Errors are logged and reported as `false`.
    async fn has_space_available(&self, force: bool) -> bool;

    /// Like [`Filesystem::has_space_available`] but reports why space is unavailable.
    async fn has_space_err(&self, force: bool) -> Result<(), FilesystemError>;

    /// Recursively applies the daemon user's ownership below `path`, which is
    /// relative to the data directory root.
    async fn chown(&self, path: &Path) -> Result<(), FilesystemError>;
}

/// A server data directory on local disk.
pub struct LocalFilesystem {
    root: PathBuf,
    disk_limit: AtomicI64,
    usage: Mutex<Option<(u64, Instant)>>,
    check_interval: Duration,
    uid: u32,
    gid: u32,
}

impl LocalFilesystem {
    pub fn new(root: impl Into<PathBuf>, check_interval: Duration, uid: u32, gid: u32) -> Self {
        Self {
            root: root.into(),
            disk_limit: AtomicI64::new(0),
            usage: Mutex::new(None),
            check_interval,
            uid,
            gid,
        }
    }

    /// Last calculated usage in bytes, if any.
    pub fn cached_usage(&self) -> Option<u64> {
        self.usage.lock().map(|(bytes, _)| bytes)
    }

    /// Disk usage in bytes, recalculated when forced or when the cached value is stale.
    pub async fn disk_usage(&self, force: bool) -> Result<u64, FilesystemError> {
        if !force {
            if let Some((bytes, at)) = *self.usage.lock() {
                if at.elapsed() < self.check_interval {
                    return Ok(bytes);
                }
            }
        }

        let root = self.root.clone();
        let bytes = tokio::task::spawn_blocking(move || directory_size(&root))
            .await
            .map_err(io::Error::other)??;
        debug!(path = %self.root.display(), bytes, "recalculated disk usage");
        *self.usage.lock() = Some((bytes, Instant::now()));
        Ok(bytes)
    }

    fn limit_bytes(&self) -> Option<u64> {
        let limit = self.disk_limit.load(Ordering::SeqCst);
        (limit > 0).then(|| limit.saturating_mul(MIB) as u64)
    }
}

#[async_trait]
impl Filesystem for LocalFilesystem {
    fn path(&self) -> PathBuf {
        self.root.clone()
    }

    fn set_disk_limit(&self, limit_mib: i64) {
        self.disk_limit.store(limit_mib, Ordering::SeqCst);
    }

    async fn has_space_available(&self, force: bool) -> bool {
        match self.has_space_err(force).await {
            Ok(()) => true,
            Err(e) => {
                if !e.is_disk_space() {
                    warn!(path = %self.root.display(), error = %e, "failed to determine disk usage");
                }
                false
            }
        }
    }

    async fn has_space_err(&self, force: bool) -> Result<(), FilesystemError> {
        // Usage is still tracked for unlimited servers, it just never fails the check.
        let used = self.disk_usage(force).await?;
        match self.limit_bytes() {
            Some(limit) if used >= limit => Err(FilesystemError::DiskSpaceExceeded { used, limit }),
            _ => Ok(()),
        }
    }

    async fn chown(&self, path: &Path) -> Result<(), FilesystemError> {
        // A freshly created server has no data directory until something writes to it.
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.root.join(path.strip_prefix("/").unwrap_or(path));
        let (uid, gid) = (self.uid, self.gid);
        tokio::task::spawn_blocking(move || chown_recursive(&target, uid, gid))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }
}

fn directory_size(root: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            // Missing root, or a file removed while walking.
            Err(e) if is_not_found(&e) => continue,
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) => total += meta.len(),
            Err(e) if is_not_found(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

fn is_not_found(e: &walkdir::Error) -> bool {
    e.io_error().is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

#[cfg(unix)]
fn chown_recursive(target: &Path, uid: u32, gid: u32) -> io::Result<()> {
    use std::os::unix::fs::lchown;

    for entry in WalkDir::new(target).follow_links(false) {
        lchown(entry?.path(), Some(uid), Some(gid))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn chown_recursive(_target: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
    Ok(())
}
