//! Content-addressed build cache
//!
//! Each build lives in `<temp root>/<namespace>/<fingerprint>/`, keyed by a
//! hash of the source contents and build flags. Same inputs = same directory.
//!
//! # Coordination
//!
//! - Readers check for the artifact without locking (it is immutable once
//!   written)
//! - Builders hold `.lock` for the whole build
//! - Distinct fingerprints never contend
//!
//! # Cache States
//!
//! | State | Artifact | Lock | Description |
//! |-------|----------|------|-------------|
//! | Complete | yes | - | Reusable as is |
//! | Building | no | held | A build is in progress |
//! | Stale | no | free | Interrupted build, cleared on next attempt |

pub mod directory;
pub mod fingerprint;
pub mod inventory;
pub mod lock;

pub use directory::{
    BuildFlags, BuildLease, BuildSlot, CacheDirectoryManager, CacheLayout, FsCacheDirectoryManager,
};
pub use fingerprint::Fingerprint;
pub use inventory::{format_bytes, CacheEntry, CacheInventory, CacheState, RemovalReport};
pub use lock::{
    FileLock, FileLockProvider, LockInfo, LockOptions, LockProvider, RetryDelay, TokioDelay,
    LOCK_FILE_NAME,
};
