//! Build cache directory management
//!
//! Decides between reusing a cached artifact and handing the caller a locked
//! directory to build into.

use crate::cache::fingerprint::Fingerprint;
use crate::cache::lock::{FileLock, LockProvider, LOCK_FILE_NAME};
use crate::cancel::CancelSignal;
use crate::error::{KilnError, KilnResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// Where cache directories live and what the artifact is called
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
    artifact_name: String,
}

impl CacheLayout {
    /// Layout rooted at `temp_root/namespace`
    pub fn new(temp_root: &Path, namespace: &str, artifact_name: impl Into<String>) -> Self {
        Self {
            root: temp_root.join(namespace),
            artifact_name: artifact_name.into(),
        }
    }

    /// Namespace directory holding every cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fixed artifact file name
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Cache directory for a fingerprint
    pub fn directory_for(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.as_str())
    }

    /// Artifact path inside a cache directory
    pub fn artifact_in(&self, directory: &Path) -> PathBuf {
        directory.join(&self.artifact_name)
    }
}

/// Build flags that participate in the fingerprint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildFlags {
    /// Whether unsafe code is allowed
    pub allow_unsafe: bool,
}

impl BuildFlags {
    /// Text form appended to the fingerprint inputs
    pub fn serialize(&self) -> String {
        self.allow_unsafe.to_string()
    }
}

/// A locked cache directory for a fresh build
#[derive(Debug)]
pub struct BuildLease {
    fingerprint: Fingerprint,
    directory: PathBuf,
    artifact: PathBuf,
    lock: FileLock,
}

impl BuildLease {
    /// Fingerprint of the inputs being built
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Directory to build into
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Where the compiler must write the artifact
    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Path of the held lock file
    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    /// Release the lock
    pub fn release(self) {
        drop(self.lock);
    }
}

/// Outcome of asking for a build slot
#[derive(Debug)]
pub enum BuildSlot {
    /// A finished artifact exists for these inputs
    Reuse { artifact: PathBuf },
    /// No artifact; the caller must build while holding the lease
    Build(BuildLease),
}

impl BuildSlot {
    /// Whether this slot reuses a cached artifact
    pub fn is_reuse(&self) -> bool {
        matches!(self, Self::Reuse { .. })
    }
}

/// Directory manager seam
#[async_trait]
pub trait CacheDirectoryManager: Send + Sync {
    /// Reuse a cached build for `inputs` or lock a directory for a new one
    async fn acquire_build_slot(
        &self,
        inputs: &[&[u8]],
        flags: BuildFlags,
        cancel: &CancelSignal,
    ) -> KilnResult<BuildSlot>;

    /// Layout in use
    fn layout(&self) -> &CacheLayout;
}

/// Filesystem-backed directory manager
pub struct FsCacheDirectoryManager {
    layout: CacheLayout,
    locks: Arc<dyn LockProvider>,
}

impl FsCacheDirectoryManager {
    /// Create a manager over `layout` using `locks` for exclusion
    pub fn new(layout: CacheLayout, locks: Arc<dyn LockProvider>) -> Self {
        Self { layout, locks }
    }

    /// Fingerprint of `inputs` followed by the serialized flags
    pub fn fingerprint(inputs: &[&[u8]], flags: BuildFlags) -> Fingerprint {
        let serialized = flags.serialize();
        Fingerprint::compute(
            inputs
                .iter()
                .copied()
                .chain(std::iter::once(serialized.as_bytes())),
        )
    }
}

#[async_trait]
impl CacheDirectoryManager for FsCacheDirectoryManager {
    async fn acquire_build_slot(
        &self,
        inputs: &[&[u8]],
        flags: BuildFlags,
        cancel: &CancelSignal,
    ) -> KilnResult<BuildSlot> {
        let fingerprint = Self::fingerprint(inputs, flags);
        let directory = self.layout.directory_for(&fingerprint);
        let artifact = self.layout.artifact_in(&directory);

        if path_exists(&artifact).await {
            info!("Inputs already compiled, reusing {}", artifact.display());
            return Ok(BuildSlot::Reuse { artifact });
        }

        fs::create_dir_all(&directory)
            .await
            .map_err(|e| KilnError::DirectoryCreate {
                path: directory.clone(),
                source: e,
            })?;

        let lock = self.locks.acquire(&directory, cancel).await?;

        // Another process may have finished the build while we waited.
        if path_exists(&artifact).await {
            info!("Inputs compiled while waiting, reusing {}", artifact.display());
            drop(lock);
            return Ok(BuildSlot::Reuse { artifact });
        }

        clear_directory_except(&directory, lock.path()).await?;

        debug!("Building {} in {}", fingerprint.short(), directory.display());
        Ok(BuildSlot::Build(BuildLease {
            fingerprint,
            directory,
            artifact,
            lock,
        }))
    }

    fn layout(&self) -> &CacheLayout {
        &self.layout
    }
}

async fn path_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Remove leftovers of an interrupted build, keeping only `keep`
async fn clear_directory_except(directory: &Path, keep: &Path) -> KilnResult<()> {
    let mut entries = fs::read_dir(directory)
        .await
        .map_err(|e| KilnError::io(format!("reading cache directory {}", directory.display()), e))?;

    let mut removed = 0usize;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| KilnError::io("reading cache directory entry", e))?
    {
        let path = entry.path();
        if path == keep || entry.file_name() == LOCK_FILE_NAME {
            continue;
        }

        let file_type = entry
            .file_type()
            .await
            .map_err(|e| KilnError::io(format!("inspecting {}", path.display()), e))?;
        let result = if file_type.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        result.map_err(|e| KilnError::io(format!("removing stale {}", path.display()), e))?;
        removed += 1;
    }

    if removed > 0 {
        debug!(
            "Removed {} leftover entries from {}",
            removed,
            directory.display()
        );
    }
    Ok(())
}
