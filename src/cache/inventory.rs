//! Cache inventory: listing, clearing and garbage collection
//!
//! Entries whose lock is held are never touched.

use crate::cache::directory::CacheLayout;
use crate::cache::fingerprint::Fingerprint;
use crate::cache::lock::FileLock;
use crate::error::{KilnError, KilnResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// State of a cache directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Artifact present, reusable
    Complete,
    /// A builder holds the lock
    Building,
    /// Neither artifact nor active lock: an interrupted build
    Stale,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Building => write!(f, "building"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// One cache directory
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    /// Fingerprint naming the directory
    pub fingerprint: String,
    /// Directory path
    pub path: PathBuf,
    /// Current state
    pub state: CacheState,
    /// Total size of files in the directory
    pub size_bytes: u64,
    /// Last modification of the directory
    pub modified: DateTime<Utc>,
}

/// What a clear or gc pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    /// Directories removed (or that would be, on a dry run)
    pub removed: Vec<PathBuf>,
    /// Directories skipped because a build holds their lock
    pub busy: Vec<PathBuf>,
    /// Bytes freed
    pub freed_bytes: u64,
}

/// Read-mostly view over a cache namespace
pub struct CacheInventory {
    layout: CacheLayout,
}

impl CacheInventory {
    /// Create an inventory over `layout`
    pub fn new(layout: CacheLayout) -> Self {
        Self { layout }
    }

    /// Namespace directory
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// List every cache directory, newest first
    pub async fn entries(&self) -> KilnResult<Vec<CacheEntry>> {
        let root = self.layout.root();
        let mut dir = match fs::read_dir(root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(KilnError::io(
                    format!("reading cache root {}", root.display()),
                    e,
                ))
            }
        };

        let mut entries = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| KilnError::io("reading cache root entry", e))?
        {
            let path = item.path();
            let Some(fingerprint) = item.file_name().to_str().and_then(Fingerprint::from_hex) else {
                continue;
            };
            if !item.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }

            let state = self.state_of(&path).await?;
            let modified = fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.push(CacheEntry {
                fingerprint: fingerprint.to_string(),
                size_bytes: dir_size(&path).await,
                path,
                state,
                modified,
            });
        }

        entries.sort_by(|a, b| b.modified.cmp(&a.modified));
        debug!("Found {} cache entries under {}", entries.len(), root.display());
        Ok(entries)
    }

    async fn state_of(&self, directory: &Path) -> KilnResult<CacheState> {
        let artifact = self.layout.artifact_in(directory);
        if fs::try_exists(&artifact).await.unwrap_or(false) {
            return Ok(CacheState::Complete);
        }
        Ok(match FileLock::try_acquire_async(directory).await? {
            Some(_unheld) => CacheState::Stale,
            None => CacheState::Building,
        })
    }

    /// Remove every entry that is not being built
    pub async fn clear(&self) -> KilnResult<RemovalReport> {
        let entries = self.entries().await?;
        self.remove_entries(entries, false).await
    }

    /// Remove stale entries, and complete entries older than `max_age_days`
    /// (0 keeps complete entries regardless of age)
    pub async fn gc(&self, max_age_days: u32, dry_run: bool) -> KilnResult<RemovalReport> {
        let cutoff = age_cutoff(Utc::now(), max_age_days);
        let candidates = self
            .entries()
            .await?
            .into_iter()
            .filter(|e| match e.state {
                CacheState::Stale => true,
                CacheState::Complete => cutoff.is_some_and(|cutoff| e.modified < cutoff),
                CacheState::Building => false,
            })
            .collect();
        self.remove_entries(candidates, dry_run).await
    }

    async fn remove_entries(
        &self,
        entries: Vec<CacheEntry>,
        dry_run: bool,
    ) -> KilnResult<RemovalReport> {
        let mut report = RemovalReport::default();

        for entry in entries {
            let Some(lock) = FileLock::try_acquire_async(&entry.path).await? else {
                report.busy.push(entry.path);
                continue;
            };

            if !dry_run {
                if let Err(e) = fs::remove_dir_all(&entry.path).await {
                    warn!("Failed to remove {}: {}", entry.path.display(), e);
                    continue;
                }
            }
            drop(lock);

            report.freed_bytes += entry.size_bytes;
            report.removed.push(entry.path);
        }

        Ok(report)
    }
}

/// Oldest modification time a complete entry may have; `None` keeps all.
/// An age reaching past the earliest representable date keeps all too.
fn age_cutoff(now: DateTime<Utc>, max_age_days: u32) -> Option<DateTime<Utc>> {
    if max_age_days == 0 {
        return None;
    }
    chrono::Duration::try_days(i64::from(max_age_days)).and_then(|age| now.checked_sub_signed(age))
}

async fn dir_size(path: &Path) -> u64 {
    let mut total = 0;
    let mut pending = vec![path.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(mut entries) = fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            match entry.metadata().await {
                Ok(meta) if meta.is_dir() => pending.push(entry.path()),
                Ok(meta) => total += meta.len(),
                Err(_) => {}
            }
        }
    }

    total
}
