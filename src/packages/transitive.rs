//! Transitive dependency resolution
//!
//! Starts from the directly declared packages (each pinned to one version)
//! and an optional fixed platform package, then walks dependency metadata.
//! Every package gets the lowest available version that satisfies all
//! requirements currently placed on it. When a package moves to another
//! version, the requirements it placed under the old one are withdrawn.
//!
//! Unlike direct resolution, disagreement here is fatal: a package with no
//! version satisfying every request is a `VersionConflict`, a package that
//! depends on itself through its own request chain is a `DependencyCycle`,
//! and unknown packages are reported together as `PackageNotFound`.

use crate::cancel::CancelSignal;
use crate::error::{KilnError, KilnResult};
use crate::packages::reference::ResolvedPackages;
use async_trait::async_trait;
use semver::{Comparator, Op, Version, VersionReq};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// A dependency declared by one package version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRequirement {
    /// Required package
    pub name: String,
    /// Acceptable versions
    pub req: VersionReq,
}

impl DependencyRequirement {
    /// Create a requirement
    pub fn new(name: impl Into<String>, req: VersionReq) -> Self {
        Self {
            name: name.into(),
            req,
        }
    }
}

/// Source of package versions and their dependencies
#[async_trait]
pub trait DependencyMetadataSource: Send + Sync {
    /// All published versions of `name`, or `None` if the package is unknown
    async fn versions(&self, name: &str) -> KilnResult<Option<Vec<Version>>>;

    /// Dependencies of one package version
    async fn dependencies(
        &self,
        name: &str,
        version: &Version,
    ) -> KilnResult<Vec<DependencyRequirement>>;
}

/// Requirement that matches exactly one version
pub fn exact_requirement(version: &Version) -> VersionReq {
    VersionReq {
        comparators: vec![Comparator {
            op: Op::Exact,
            major: version.major,
            minor: Some(version.minor),
            patch: Some(version.patch),
            pre: version.pre.clone(),
        }],
    }
}

#[derive(Debug, Clone)]
struct Hop {
    name: String,
    version: Version,
}

#[derive(Debug, Clone)]
struct Requirement {
    /// Package that placed the requirement, `None` for roots
    from: Option<String>,
    req: VersionReq,
    /// Packages between the root and the requester, requester included
    chain: Vec<Hop>,
}

impl Requirement {
    fn describe(&self, name: &str) -> String {
        let mut hops = vec!["root".to_string()];
        hops.extend(self.chain.iter().map(|h| format!("{} {}", h.name, h.version)));
        hops.push(format!("{} {}", name, self.req));
        hops.join(" -> ")
    }
}

/// Walks and solves the dependency graph
pub struct TransitiveResolver {
    source: Arc<dyn DependencyMetadataSource>,
    platform: Option<(String, Version)>,
    max_steps: usize,
}

impl TransitiveResolver {
    /// Resolver over `source` without a platform package
    pub fn new(source: Arc<dyn DependencyMetadataSource>) -> Self {
        Self {
            source,
            platform: None,
            max_steps: 10_000,
        }
    }

    /// Always include `name` at `version` as an extra root
    pub fn with_platform(mut self, name: impl Into<String>, version: Version) -> Self {
        self.platform = Some((name.into(), version));
        self
    }

    /// Resolve the closure of `direct`
    pub async fn resolve(
        &self,
        direct: &ResolvedPackages,
        cancel: &CancelSignal,
    ) -> KilnResult<ResolvedPackages> {
        let mut walk = Walk::default();

        let roots: Vec<(String, Version)> = direct
            .iter()
            .map(|(name, version)| (name.to_string(), version.clone()))
            .chain(self.platform.iter().cloned())
            .collect();

        for (name, version) in &roots {
            walk.require(
                name,
                Requirement {
                    from: None,
                    req: exact_requirement(version),
                    chain: Vec::new(),
                },
            );
        }

        let mut steps = 0usize;
        while let Some(name) = walk.queue.pop_front() {
            if cancel.is_cancelled() {
                return Err(KilnError::Cancelled);
            }
            steps += 1;
            if steps > self.max_steps {
                return Err(KilnError::Internal(format!(
                    "dependency resolution did not settle after {} steps",
                    self.max_steps
                )));
            }

            self.visit(&name, &mut walk).await?;
        }

        walk.finish(&roots)
    }

    async fn visit(&self, name: &str, walk: &mut Walk) -> KilnResult<()> {
        let requirements = walk.requirements.get(name).cloned().unwrap_or_default();
        if requirements.is_empty() {
            if walk.selected.remove(name).is_some() {
                debug!("{} is no longer required", name);
                walk.withdraw(name);
            }
            walk.unsatisfied.remove(name);
            return Ok(());
        }

        let Some(versions) = self.available(name, walk).await? else {
            walk.missing.insert(name.to_string());
            return Ok(());
        };

        let Some(candidate) = versions
            .iter()
            .find(|v| requirements.iter().all(|r| r.req.matches(v)))
            .cloned()
        else {
            debug!("No version of {} satisfies current requests", name);
            walk.unsatisfied.insert(name.to_string());
            return Ok(());
        };
        walk.unsatisfied.remove(name);

        if walk.selected.get(name) == Some(&candidate) {
            return Ok(());
        }
        if let Some(previous) = walk.selected.insert(name.to_string(), candidate.clone()) {
            debug!("{} moves from {} to {}", name, previous, candidate);
            walk.withdraw(name);
        }

        let dependencies = self.source.dependencies(name, &candidate).await?;

        let mut chain = requirements[0].chain.clone();
        chain.push(Hop {
            name: name.to_string(),
            version: candidate.clone(),
        });

        let mut edges = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            if chain.iter().any(|hop| hop.name == dependency.name) {
                let mut hops: Vec<String> = chain
                    .iter()
                    .map(|h| format!("{} {}", h.name, h.version))
                    .collect();
                hops.push(dependency.name.clone());
                return Err(KilnError::DependencyCycle {
                    chain: hops.join(" -> "),
                });
            }

            edges.push(dependency.name.clone());
            walk.require(
                &dependency.name,
                Requirement {
                    from: Some(name.to_string()),
                    req: dependency.req,
                    chain: chain.clone(),
                },
            );
        }
        walk.edges.insert(name.to_string(), edges);

        Ok(())
    }

    async fn available(&self, name: &str, walk: &mut Walk) -> KilnResult<Option<Vec<Version>>> {
        if let Some(cached) = walk.available.get(name) {
            return Ok(cached.clone());
        }

        let mut versions = self.source.versions(name).await?;
        if let Some(versions) = versions.as_mut() {
            versions.sort();
            versions.dedup();
        }
        walk.available.insert(name.to_string(), versions.clone());
        Ok(versions)
    }
}

#[derive(Default)]
struct Walk {
    requirements: BTreeMap<String, Vec<Requirement>>,
    selected: BTreeMap<String, Version>,
    edges: BTreeMap<String, Vec<String>>,
    available: HashMap<String, Option<Vec<Version>>>,
    missing: BTreeSet<String>,
    unsatisfied: BTreeSet<String>,
    queue: VecDeque<String>,
}

impl Walk {
    fn require(&mut self, name: &str, requirement: Requirement) {
        self.requirements
            .entry(name.to_string())
            .or_default()
            .push(requirement);
        self.queue.push_back(name.to_string());
    }

    /// Drop every requirement placed by `from` and revisit the packages affected
    fn withdraw(&mut self, from: &str) {
        self.edges.remove(from);
        for (name, requirements) in self.requirements.iter_mut() {
            let before = requirements.len();
            requirements.retain(|r| r.from.as_deref() != Some(from));
            if requirements.len() != before {
                self.queue.push_back(name.clone());
            }
        }
    }

    fn is_required(&self, name: &str) -> bool {
        self.requirements.get(name).is_some_and(|r| !r.is_empty())
    }

    fn finish(self, roots: &[(String, Version)]) -> KilnResult<ResolvedPackages> {
        if let Some(name) = self.unsatisfied.iter().find(|n| self.is_required(n)) {
            let requests = self.requirements[name.as_str()]
                .iter()
                .map(|r| r.describe(name))
                .collect();
            return Err(KilnError::VersionConflict {
                package: name.clone(),
                requests,
            });
        }

        let missing: Vec<String> = self
            .missing
            .iter()
            .filter(|n| self.is_required(n))
            .map(|n| {
                let requests: Vec<String> = self.requirements[n.as_str()]
                    .iter()
                    .map(|r| r.req.to_string())
                    .collect();
                format!("{} ({})", n, requests.join(", "))
            })
            .collect();
        if !missing.is_empty() {
            return Err(KilnError::PackageNotFound { packages: missing });
        }

        // Keep only what is reachable from the roots through current selections.
        let mut resolved = ResolvedPackages::new();
        let mut pending: Vec<&str> = roots.iter().map(|(name, _)| name.as_str()).collect();
        while let Some(name) = pending.pop() {
            if resolved.get(name).is_some() {
                continue;
            }
            let Some(version) = self.selected.get(name) else {
                continue;
            };
            resolved.insert(name, version.clone());
            if let Some(edges) = self.edges.get(name) {
                pending.extend(edges.iter().map(String::as_str));
            }
        }

        info!("Resolved {} packages including dependencies", resolved.len());
        Ok(resolved)
    }
}
