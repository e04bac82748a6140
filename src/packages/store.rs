//! Local package store
//!
//! A directory tree of published packages:
//!
//! ```text
//! <store>/<name>/<version>/package.toml
//! <store>/<name>/<version>/lib/[<framework>/]*.dll
//! ```
//!
//! The manifest is optional. Without one the package has no dependencies.

use crate::cancel::CancelSignal;
use crate::error::{KilnError, KilnResult};
use crate::packages::reference::{parse_version, ResolvedPackages};
use crate::packages::transitive::{DependencyMetadataSource, DependencyRequirement};
use crate::toolchain::PackageFetcher;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use semver::{Version, VersionReq};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manifest file name inside a version directory
pub const MANIFEST_FILE: &str = "package.toml";

/// Directory holding library files inside a version directory
pub const LIB_DIR: &str = "lib";

/// Parsed `package.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    /// Package metadata
    pub package: PackageMeta,

    /// Dependency name to version requirement
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

/// `[package]` section
#[derive(Debug, Clone, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    pub version: String,
}

impl PackageManifest {
    /// Parse a manifest from a TOML file on disk
    pub async fn from_file(path: &Path) -> KilnResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| KilnError::io(format!("reading package manifest {}", path.display()), e))?;
        Self::parse(&content, path)
    }

    /// Parse a manifest from a TOML string; `path` is only used in errors
    pub fn parse(content: &str, path: &Path) -> KilnResult<Self> {
        toml::from_str(content).map_err(|e| KilnError::PackageManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Dependencies as typed requirements
    pub fn requirements(&self, path: &Path) -> KilnResult<Vec<DependencyRequirement>> {
        self.dependencies
            .iter()
            .map(|(name, req)| {
                let req = VersionReq::parse(req).map_err(|e| KilnError::PackageManifestInvalid {
                    path: path.to_path_buf(),
                    reason: format!("dependency {}: {}", name, e),
                })?;
                Ok(DependencyRequirement::new(name.clone(), req))
            })
            .collect()
    }
}

/// Package store rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalPackageStore {
    root: PathBuf,
    library_extensions: Vec<String>,
}

impl LocalPackageStore {
    /// Store at `root` that copies files with one of `library_extensions`
    /// (all files when empty)
    pub fn new(root: impl Into<PathBuf>, library_extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            library_extensions,
        }
    }

    /// Store root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Version directories of `name` keyed by parsed version
    async fn version_dirs(&self, name: &str) -> KilnResult<Option<BTreeMap<Version, PathBuf>>> {
        let package_dir = self.root.join(name);
        let mut entries = match tokio::fs::read_dir(&package_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(KilnError::io(
                    format!("reading package directory {}", package_dir.display()),
                    e,
                ))
            }
        };

        let mut versions = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KilnError::io(format!("listing {}", package_dir.display()), e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            let dir_name = entry.file_name();
            match dir_name.to_str().and_then(parse_version) {
                Some(version) => {
                    versions.insert(version, entry.path());
                }
                None => debug!("Skipping non-version directory {}", entry.path().display()),
            }
        }

        Ok((!versions.is_empty()).then_some(versions))
    }

    async fn version_dir(&self, name: &str, version: &Version) -> KilnResult<Option<PathBuf>> {
        let direct = self.root.join(name).join(version.to_string());
        if tokio::fs::metadata(&direct).await.is_ok_and(|m| m.is_dir()) {
            return Ok(Some(direct));
        }
        Ok(self
            .version_dirs(name)
            .await?
            .and_then(|mut dirs| dirs.remove(version)))
    }

    fn is_library(&self, path: &Path) -> bool {
        if self.library_extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.library_extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }

    /// Copy one package's libraries into `<extract_dir>/<name>/<version>/`
    async fn copy_package(
        &self,
        name: &str,
        version: &Version,
        source_dir: &Path,
        target_framework: Option<&str>,
        extract_dir: &Path,
    ) -> KilnResult<Vec<PathBuf>> {
        let mut lib_dir = source_dir.join(LIB_DIR);
        if let Some(framework) = target_framework {
            let framework_dir = lib_dir.join(framework);
            if tokio::fs::metadata(&framework_dir).await.is_ok_and(|m| m.is_dir()) {
                lib_dir = framework_dir;
            }
        }

        let mut entries = match tokio::fs::read_dir(&lib_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Package {} {} has no libraries", name, version);
                return Ok(Vec::new());
            }
            Err(e) => return Err(KilnError::io(format!("reading {}", lib_dir.display()), e)),
        };

        let target_dir = extract_dir.join(name).join(version.to_string());
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| KilnError::io(format!("creating {}", target_dir.display()), e))?;

        let mut copied = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| KilnError::io(format!("listing {}", lib_dir.display()), e))?
        {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file || !self.is_library(&path) {
                continue;
            }

            let target = target_dir.join(entry.file_name());
            tokio::fs::copy(&path, &target).await.map_err(|e| {
                KilnError::io(format!("copying {} to {}", path.display(), target.display()), e)
            })?;
            copied.push(target);
        }

        debug!("Extracted {} libraries from {} {}", copied.len(), name, version);
        Ok(copied)
    }
}

#[async_trait]
impl DependencyMetadataSource for LocalPackageStore {
    async fn versions(&self, name: &str) -> KilnResult<Option<Vec<Version>>> {
        Ok(self
            .version_dirs(name)
            .await?
            .map(|dirs| dirs.into_keys().collect()))
    }

    async fn dependencies(
        &self,
        name: &str,
        version: &Version,
    ) -> KilnResult<Vec<DependencyRequirement>> {
        let Some(dir) = self.version_dir(name, version).await? else {
            return Err(KilnError::PackageNotFound {
                packages: vec![format!("{} {}", name, version)],
            });
        };

        let manifest_path = dir.join(MANIFEST_FILE);
        if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let manifest = PackageManifest::from_file(&manifest_path).await?;
        if manifest.package.name != name {
            return Err(KilnError::PackageManifestInvalid {
                path: manifest_path,
                reason: format!(
                    "declares package {} but is stored under {}",
                    manifest.package.name, name
                ),
            });
        }
        manifest.requirements(&manifest_path)
    }
}

#[async_trait]
impl PackageFetcher for LocalPackageStore {
    async fn fetch(
        &self,
        packages: &ResolvedPackages,
        target_framework: Option<&str>,
        extract_dir: &Path,
        cancel: &CancelSignal,
    ) -> KilnResult<Vec<PathBuf>> {
        let mut located = Vec::with_capacity(packages.len());
        let mut missing = Vec::new();
        for (name, version) in packages.iter() {
            match self.version_dir(name, version).await? {
                Some(dir) => located.push((name, version, dir)),
                None => missing.push(format!("{} {}", name, version)),
            }
        }
        if !missing.is_empty() {
            return Err(KilnError::PackageNotFound { packages: missing });
        }

        if cancel.is_cancelled() {
            return Err(KilnError::Cancelled);
        }

        let copies = located.iter().map(|(name, version, dir)| {
            self.copy_package(name, version, dir, target_framework, extract_dir)
        });

        let libraries = tokio::select! {
            copied = try_join_all(copies) => copied?,
            _ = cancel.cancelled() => return Err(KilnError::Cancelled),
        };

        let mut libraries: Vec<PathBuf> = libraries.into_iter().flatten().collect();
        libraries.sort();
        info!("Fetched {} packages ({} libraries)", packages.len(), libraries.len());
        Ok(libraries)
    }
}
