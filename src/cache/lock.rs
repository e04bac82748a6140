//! Cross-process build lock
//!
//! The lock is a `.lock` file inside a cache directory held with an exclusive
//! OS file lock (`flock` on Unix, `LockFileEx` on Windows). The OS drops the
//! lock when the holder exits by any means, so a crashed builder never wedges
//! the directory.
//!
//! Release happens in `Drop`: the path is unlinked first, then the handle is
//! closed.

use crate::cancel::CancelSignal;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// File name of the lock inside a cache directory
pub const LOCK_FILE_NAME: &str = ".lock";

/// Retry policy for lock acquisition
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// Delay between attempts
    pub retry_delay: Duration,
    /// Total time to wait before giving up
    pub timeout: Duration,
}

impl LockOptions {
    /// Number of attempts the retry loop makes
    pub fn max_attempts(&self) -> u64 {
        let delay = self.retry_delay.as_millis().max(1);
        (self.timeout.as_millis() / delay).max(1) as u64
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Delay between lock attempts, injectable for tests
#[async_trait]
pub trait RetryDelay: Send + Sync {
    /// Wait for `delay` before the next attempt
    async fn wait(&self, delay: Duration);
}

/// Real delay backed by the tokio timer
#[derive(Debug, Default)]
pub struct TokioDelay;

#[async_trait]
impl RetryDelay for TokioDelay {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Diagnostic body written into a held lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique id of this acquisition
    pub holder: Uuid,
    /// Process id of the holder
    pub pid: u32,
    /// When the lock was taken
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            holder: Uuid::new_v4(),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    /// Read the info of whoever holds the lock at `path`
    pub async fn read(path: &Path) -> Option<Self> {
        let content = tokio::fs::read_to_string(path).await.ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// A held build lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    info: LockInfo,
    file: Option<File>,
}

impl FileLock {
    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Diagnostic info of this acquisition
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Make a single non-blocking attempt to take the lock in `directory`
    pub fn try_acquire(directory: &Path) -> KilnResult<Option<Self>> {
        Self::attempt(directory).map_err(|e| {
            KilnError::io(
                format!("opening lock file {}", directory.join(LOCK_FILE_NAME).display()),
                e,
            )
        })
    }

    /// [`FileLock::try_acquire`] on the blocking thread pool
    pub async fn try_acquire_async(directory: &Path) -> KilnResult<Option<Self>> {
        let path = directory.join(LOCK_FILE_NAME);
        Self::attempt_blocking(directory)
            .await?
            .map_err(|e| KilnError::io(format!("opening lock file {}", path.display()), e))
    }

    async fn attempt_blocking(directory: &Path) -> KilnResult<io::Result<Option<Self>>> {
        let owned = directory.to_path_buf();
        tokio::task::spawn_blocking(move || Self::attempt(&owned))
            .await
            .map_err(|e| {
                KilnError::io(
                    format!("locking {}", directory.display()),
                    io::Error::other(e),
                )
            })
    }

    /// One attempt: `Ok(None)` on contention, `NotFound` when the directory
    /// itself is gone
    fn attempt(directory: &Path) -> io::Result<Option<Self>> {
        let path = directory.join(LOCK_FILE_NAME);
        let mut file = match try_lock(&path) {
            Ok(Some(file)) => file,
            Ok(None) => return Ok(None),
            Err(e) if is_contention(&e) => return Ok(None),
            Err(e) => return Err(e),
        };

        let info = LockInfo::current();
        if let Err(e) = write_info(&mut file, &info) {
            debug!("Could not record lock holder in {}: {}", path.display(), e);
        }
        Ok(Some(Self {
            path,
            info,
            file: Some(file),
        }))
    }

    /// Acquire the lock in `directory`, retrying until the timeout expires
    /// or `cancel` fires.
    ///
    /// A directory removed under a waiter (by `cache gc` or `cache clear`)
    /// is recreated and the wait continues.
    pub async fn acquire(
        directory: &Path,
        options: &LockOptions,
        delay: &dyn RetryDelay,
        cancel: &CancelSignal,
    ) -> KilnResult<Self> {
        let path = directory.join(LOCK_FILE_NAME);

        for attempt in 0..options.max_attempts() {
            if cancel.is_cancelled() {
                return Err(KilnError::LockCancelled { path });
            }

            match Self::attempt_blocking(directory).await? {
                Ok(Some(lock)) => {
                    debug!("Acquired {} after {} attempt(s)", path.display(), attempt + 1);
                    return Ok(lock);
                }
                Ok(None) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{} was removed while waiting, recreating", directory.display());
                    tokio::fs::create_dir_all(directory)
                        .await
                        .map_err(|e| KilnError::DirectoryCreate {
                            path: directory.to_path_buf(),
                            source: e,
                        })?;
                    continue;
                }
                Err(e) => {
                    return Err(KilnError::io(
                        format!("opening lock file {}", path.display()),
                        e,
                    ))
                }
            }

            if attempt == 0 {
                debug!("Build lock {} is held, waiting", path.display());
            }

            tokio::select! {
                _ = delay.wait(options.retry_delay) => {}
                _ = cancel.cancelled() => {
                    return Err(KilnError::LockCancelled { path });
                }
            }
        }

        let holder = LockInfo::read(&path)
            .await
            .map(|info| format!("pid {} since {}", info.pid, info.acquired_at.to_rfc3339()));
        Err(KilnError::LockTimeout {
            path,
            waited_secs: options.timeout.as_secs(),
            holder,
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlink while still holding the lock so no waiter can lock the old inode
        // and believe it owns the path.
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove lock file {}: {}", self.path.display(), e),
        }
        drop(self.file.take());
        debug!("Released {}", self.path.display());
    }
}

/// Lock acquisition seam used by the directory manager
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Acquire the build lock for `directory`
    async fn acquire(&self, directory: &Path, cancel: &CancelSignal) -> KilnResult<FileLock>;
}

/// `LockProvider` backed by lock files
pub struct FileLockProvider {
    options: LockOptions,
    delay: Arc<dyn RetryDelay>,
}

impl FileLockProvider {
    /// Create a provider with real tokio delays
    pub fn new(options: LockOptions) -> Self {
        Self::with_delay(options, Arc::new(TokioDelay))
    }

    /// Create a provider with a custom delay
    pub fn with_delay(options: LockOptions, delay: Arc<dyn RetryDelay>) -> Self {
        Self { options, delay }
    }

    /// The retry policy in use
    pub fn options(&self) -> &LockOptions {
        &self.options
    }
}

#[async_trait]
impl LockProvider for FileLockProvider {
    async fn acquire(&self, directory: &Path, cancel: &CancelSignal) -> KilnResult<FileLock> {
        FileLock::acquire(directory, &self.options, self.delay.as_ref(), cancel).await
    }
}

/// Open the lock file and take a non-blocking exclusive lock.
///
/// `Ok(None)` means another holder has it, or the path was unlinked between
/// our open and our lock.
fn try_lock(path: &Path) -> io::Result<Option<File>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {}
        Err(e) if is_contention(&e) => return Ok(None),
        Err(e) => return Err(e),
    }

    if still_at_path(&file, path)? {
        Ok(Some(file))
    } else {
        Ok(None)
    }
}

#[cfg(unix)]
fn still_at_path(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(current.ino() == held.ino() && current.dev() == held.dev()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

// An unlinked lock file stays delete-pending while any handle is open, so
// nobody can recreate the path underneath us.
#[cfg(not(unix))]
fn still_at_path(_file: &File, _path: &Path) -> io::Result<bool> {
    Ok(true)
}

fn write_info(file: &mut File, info: &LockInfo) -> io::Result<()> {
    let body = serde_json::to_string(info).map_err(io::Error::other)?;
    file.set_len(0)?;
    file.write_all(body.as_bytes())?;
    file.flush()
}

fn is_contention(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
    ) || is_lock_violation(e)
}

/// `ERROR_LOCK_VIOLATION` from `LockFileEx`
#[cfg(windows)]
fn is_lock_violation(e: &io::Error) -> bool {
    e.raw_os_error() == Some(33)
}

#[cfg(not(windows))]
fn is_lock_violation(_e: &io::Error) -> bool {
    false
}
