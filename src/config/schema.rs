//! Configuration schema for kiln
//!
//! Configuration is stored at `~/.config/kiln/config.toml`. Every section is
//! optional; missing keys fall back to the defaults below.

use crate::cache::{CacheLayout, LockOptions};
use crate::error::{KilnError, KilnResult};
use crate::packages::parse_version;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Build cache settings
    pub cache: CacheConfig,

    /// Compiler invocation
    pub compiler: CompilerConfig,

    /// Package directives and store
    pub packages: PackagesConfig,

    /// Artifact execution
    pub runner: RunnerConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Build cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory under the cache root holding all builds
    pub namespace: String,

    /// File name of the build artifact
    pub artifact_name: String,

    /// Cache root (default: system temp dir)
    pub root: Option<PathBuf>,

    /// Give up waiting for another builder after this many seconds
    pub lock_timeout_secs: u64,

    /// Delay between lock attempts
    pub lock_retry_delay_ms: u64,

    /// `kiln cache gc` removes builds older than N days
    pub gc_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "kiln".to_string(),
            artifact_name: "Generated.dll".to_string(),
            root: None,
            lock_timeout_secs: 60,
            lock_retry_delay_ms: 10,
            gc_days: 30,
        }
    }
}

impl CacheConfig {
    /// Effective cache root
    pub fn root_dir(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Directory layout of the build cache
    pub fn layout(&self) -> CacheLayout {
        CacheLayout::new(&self.root_dir(), &self.namespace, self.artifact_name.clone())
    }

    /// Lock retry policy
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            retry_delay: self.lock_retry_delay(),
            timeout: self.lock_timeout(),
        }
    }

    /// Lock wait budget
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Delay between lock attempts
    pub fn lock_retry_delay(&self) -> Duration {
        Duration::from_millis(self.lock_retry_delay_ms)
    }
}

/// Compiler configuration
///
/// Arguments may use `{artifact}`, `{out_dir}`, `{sources}` and
/// `{libraries}`. An argument containing `{sources}` or `{libraries}` is
/// repeated once per path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Compiler executable
    pub program: String,

    /// Argument template
    pub args: Vec<String>,

    /// Extra arguments when unsafe code is allowed
    pub unsafe_args: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: "csc".to_string(),
            args: vec![
                "-nologo".to_string(),
                "-target:exe".to_string(),
                "-out:{artifact}".to_string(),
                "-reference:{libraries}".to_string(),
                "{sources}".to_string(),
            ],
            unsafe_args: vec!["-unsafe".to_string()],
        }
    }
}

/// Package configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Directive keyword in comments
    pub directive: String,

    /// Local package store (default: `<data dir>/kiln/packages`)
    pub store: Option<PathBuf>,

    /// Preferred `lib/<framework>/` subdirectory
    pub target_framework: Option<String>,

    /// Package always added to transitive resolution, as `Name@version`
    pub platform_package: Option<String>,

    /// Resolve dependencies of declared packages
    pub transitive: bool,

    /// File extensions copied out of a package's `lib/`
    pub library_extensions: Vec<String>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            directive: "Package:".to_string(),
            store: None,
            target_framework: Some("net6.0".to_string()),
            platform_package: None,
            transitive: false,
            library_extensions: vec!["dll".to_string()],
        }
    }
}

impl PackagesConfig {
    /// Effective store directory
    pub fn store_dir(&self) -> PathBuf {
        self.store.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("kiln")
                .join("packages")
        })
    }

    /// Parsed platform package
    pub fn platform(&self) -> KilnResult<Option<(String, Version)>> {
        let Some(spec) = self.platform_package.as_deref() else {
            return Ok(None);
        };

        let parsed = spec
            .split_once('@')
            .and_then(|(name, version)| Some((name.trim(), parse_version(version)?)))
            .filter(|(name, _)| !name.is_empty());

        match parsed {
            Some((name, version)) => Ok(Some((name.to_string(), version))),
            None => Err(KilnError::User(format!(
                "Invalid packages.platform_package '{}': expected Name@version",
                spec
            ))),
        }
    }
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Launcher program; the artifact is executed directly when empty
    pub program: String,

    /// Launcher arguments placed before the artifact path
    pub args: Vec<String>,
}

impl RunnerConfig {
    /// Launcher program, if any
    pub fn launcher(&self) -> Option<&str> {
        let program = self.program.trim();
        (!program.is_empty()).then_some(program)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "dotnet".to_string(),
            args: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[cache]"));
        assert!(toml.contains("[compiler]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.cache.namespace, "kiln");
        assert_eq!(config.cache.lock_retry_delay(), Duration::from_millis(10));
        assert_eq!(config.cache.lock_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [cache]
            namespace = "scripts"

            [runner]
            program = "mono"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.namespace, "scripts");
        assert_eq!(config.cache.artifact_name, "Generated.dll"); // default preserved
        assert_eq!(config.runner.launcher(), Some("mono"));
    }

    #[test]
    fn platform_package_parses() {
        let mut packages = PackagesConfig::default();
        assert!(packages.platform().unwrap().is_none());

        packages.platform_package = Some("Microsoft.NETCore.App.Ref@6.0.4".to_string());
        assert_eq!(
            packages.platform().unwrap(),
            Some(("Microsoft.NETCore.App.Ref".to_string(), Version::new(6, 0, 4)))
        );

        packages.platform_package = Some("NoVersion".to_string());
        assert!(packages.platform().is_err());
        packages.platform_package = Some("@1.0.0".to_string());
        assert!(packages.platform().is_err());
    }

    #[test]
    fn explicit_roots_override_defaults() {
        let toml = r#"
            [cache]
            root = "/var/tmp/builds"
            [packages]
            store = "/srv/packages"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.root_dir(), PathBuf::from("/var/tmp/builds"));
        assert_eq!(config.packages.store_dir(), PathBuf::from("/srv/packages"));
    }
}
