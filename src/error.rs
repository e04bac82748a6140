//! Error types for kiln
//!
//! All modules use `KilnResult<T>` as their return type. A cache miss is not
//! an error: it is the `BuildSlot::Build` variant.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kiln operations
pub type KilnResult<T> = Result<T, KilnError>;

/// All errors that can occur in kiln
#[derive(Error, Debug)]
pub enum KilnError {
    // Lock errors
    #[error("Timed out after {waited_secs}s waiting for build lock {path}{}", holder_suffix(.holder))]
    LockTimeout {
        path: PathBuf,
        waited_secs: u64,
        holder: Option<String>,
    },

    #[error("Cancelled while waiting for build lock {path}")]
    LockCancelled { path: PathBuf },

    #[error("Operation cancelled")]
    Cancelled,

    // Cache errors
    #[error("Failed to create cache directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Package errors
    #[error("Version conflict for package {package}:\n  {}", .requests.join("\n  "))]
    VersionConflict {
        package: String,
        requests: Vec<String>,
    },

    #[error("Dependency cycle detected: {chain}")]
    DependencyCycle { chain: String },

    #[error("Packages not found: {}", .packages.join(", "))]
    PackageNotFound { packages: Vec<String> },

    #[error("Invalid package manifest at {path}: {reason}")]
    PackageManifestInvalid { path: PathBuf, reason: String },

    // Source errors
    #[error("No source files to compile")]
    NoSourceFiles,

    #[error("Source files not found:\n  {}", .paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join("\n  "))]
    SourceFilesMissing { paths: Vec<PathBuf> },

    // Toolchain errors
    #[error("Compilation failed ({program}, exit code {code}):\n{output}")]
    CompileFailed {
        program: String,
        code: i32,
        output: String,
    },

    #[error("Compiler reported success but no artifact was written to {0}")]
    ArtifactMissing(PathBuf),

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn holder_suffix(holder: &Option<String>) -> String {
    match holder {
        Some(h) => format!(" (held by {})", h),
        None => String::new(),
    }
}

impl KilnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Whether this error is the caller's own cancellation rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::LockCancelled { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockTimeout { .. } => {
                Some("Another build of the same sources is still running. Retry, or run: kiln cache gc")
            }
            Self::DirectoryCreate { .. } => {
                Some("Check permissions of the cache root, or set cache.root in the config")
            }
            Self::VersionConflict { .. } => {
                Some("Pin a version that satisfies every request in a Package: directive")
            }
            Self::PackageNotFound { .. } => Some("Check packages.store in the config"),
            Self::NoSourceFiles => Some("Usage: kiln run <FILES>... [-- <ARGS>...]"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_names_path_and_holder() {
        let err = KilnError::LockTimeout {
            path: PathBuf::from("/tmp/kiln/abc/.lock"),
            waited_secs: 60,
            holder: Some("pid 42".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/kiln/abc/.lock"));
        assert!(msg.contains("held by pid 42"));
    }

    #[test]
    fn package_not_found_lists_all() {
        let err = KilnError::PackageNotFound {
            packages: vec!["Foo 1.0.0".to_string(), "Bar 2.0.0".to_string()],
        };
        assert_eq!(err.to_string(), "Packages not found: Foo 1.0.0, Bar 2.0.0");
    }

    #[test]
    fn cancellation_is_not_failure() {
        assert!(KilnError::Cancelled.is_cancellation());
        assert!(KilnError::LockCancelled {
            path: PathBuf::from(".lock")
        }
        .is_cancellation());
        assert!(!KilnError::NoSourceFiles.is_cancellation());
    }

    #[test]
    fn error_hint() {
        assert!(KilnError::NoSourceFiles.hint().is_some());
        assert!(KilnError::Internal("x".to_string()).hint().is_none());
    }
}
