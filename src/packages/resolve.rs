//! Direct package version resolution
//!
//! Several directives may name the same package with different versions. The
//! highest requested version wins; the conflict is reported as a warning, not
//! an error.

use crate::packages::reference::{PackageReference, ResolvedPackages};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Resolution seam
pub trait VersionResolver: Send + Sync {
    /// Pick exactly one version per package name
    fn resolve(&self, references: &[PackageReference]) -> ResolvedPackages;
}

/// Selects the maximum requested version of every package
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxVersionResolver;

impl VersionResolver for MaxVersionResolver {
    fn resolve(&self, references: &[PackageReference]) -> ResolvedPackages {
        let mut requested: BTreeMap<&str, BTreeSet<Version>> = BTreeMap::new();

        for reference in references {
            match reference.version() {
                Some(version) => {
                    requested
                        .entry(reference.name.as_str())
                        .or_default()
                        .insert(version);
                }
                None => debug!("Discarding unparseable reference {}", reference),
            }
        }

        requested
            .into_iter()
            .filter_map(|(name, versions)| {
                let chosen = versions.last()?.clone();
                if versions.len() > 1 {
                    let listed: Vec<String> = versions.iter().map(Version::to_string).collect();
                    warn!(
                        "Package {} is requested with different versions ({}), using {}",
                        name,
                        listed.join(", "),
                        chosen
                    );
                }
                Some((name.to_string(), chosen))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(items: &[(&str, &str)]) -> Vec<PackageReference> {
        items
            .iter()
            .map(|(name, version)| PackageReference::new(*name, *version))
            .collect()
    }

    #[test]
    fn highest_version_wins() {
        let resolved = MaxVersionResolver.resolve(&refs(&[
            ("Foo", "1.0.0"),
            ("Foo", "2.3.1"),
            ("Bar", "0.9.0-beta1"),
        ]));

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.get("Foo"), Some(&Version::new(2, 3, 1)));
        assert_eq!(resolved.get("Bar").unwrap().to_string(), "0.9.0-beta1");
    }

    #[test]
    fn release_beats_prerelease() {
        let resolved = MaxVersionResolver.resolve(&refs(&[("Foo", "1.0.0"), ("Foo", "1.0.0-beta")]));
        assert_eq!(resolved.get("Foo"), Some(&Version::new(1, 0, 0)));
    }

    #[test]
    fn unparseable_versions_are_discarded() {
        let resolved = MaxVersionResolver.resolve(&refs(&[
            ("Foo", "not-a-version"),
            ("Bar", "1.2"),
            ("Bar", "garbage"),
        ]));
        assert_eq!(resolved.get("Foo"), None);
        assert_eq!(resolved.get("Bar"), Some(&Version::new(1, 2, 0)));
    }

    #[test]
    fn names_are_case_sensitive() {
        let resolved = MaxVersionResolver.resolve(&refs(&[("foo", "1.0.0"), ("Foo", "2.0.0")]));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn duplicates_of_same_version_collapse() {
        let resolved = MaxVersionResolver.resolve(&refs(&[("Foo", "1.0"), ("Foo", "1.0.0")]));
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved.get("Foo"), Some(&Version::new(1, 0, 0)));
    }

    #[test]
    fn empty_input() {
        assert!(MaxVersionResolver.resolve(&[]).is_empty());
    }
}
