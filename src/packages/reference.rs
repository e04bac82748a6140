//! Package references and resolved package sets

use semver::Version;
use std::collections::BTreeMap;
use std::fmt;

/// A `(name, version)` directive as written in a source comment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageReference {
    /// Package name
    pub name: String,
    /// Version text, not yet validated
    pub version_text: String,
}

impl PackageReference {
    /// Create a reference
    pub fn new(name: impl Into<String>, version_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_text: version_text.into(),
        }
    }

    /// Parsed version, if the text is a valid version
    pub fn version(&self) -> Option<Version> {
        parse_version(&self.version_text)
    }
}

impl fmt::Display for PackageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version_text)
    }
}

/// Parse a package version.
///
/// Registries commonly publish `1.2` or `1` for `1.2.0` / `1.0.0`, so missing
/// minor and patch components are filled with zeros. Anything else must be
/// valid SemVer.
pub fn parse_version(text: &str) -> Option<Version> {
    let text = text.trim();
    let core_end = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(core_end);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    if parts
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut normalized = parts.join(".");
    for _ in parts.len()..3 {
        normalized.push_str(".0");
    }
    normalized.push_str(suffix);

    Version::parse(&normalized).ok()
}

/// Exactly one selected version per package name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPackages {
    packages: BTreeMap<String, Version>,
}

impl ResolvedPackages {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `version` for `name`, replacing any previous selection
    pub fn insert(&mut self, name: impl Into<String>, version: Version) -> Option<Version> {
        self.packages.insert(name.into(), version)
    }

    /// Selected version of `name`
    pub fn get(&self, name: &str) -> Option<&Version> {
        self.packages.get(name)
    }

    /// Number of packages
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether no packages are selected
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Version)> {
        self.packages.iter().map(|(name, version)| (name.as_str(), version))
    }
}

impl FromIterator<(String, Version)> for ResolvedPackages {
    fn from_iter<T: IntoIterator<Item = (String, Version)>>(iter: T) -> Self {
        Self {
            packages: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ResolvedPackages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self
            .iter()
            .map(|(name, version)| format!("{} {}", name, version))
            .collect();
        write!(f, "{}", items.join(", "))
    }
}
