//! Build and run pipeline
//!
//! Ties the cache, package resolution and toolchain together:
//!
//! 1. Validate and read the sources
//! 2. Ask the cache for a build slot keyed by contents and flags
//! 3. On reuse, hand back the cached artifact
//! 4. Otherwise resolve packages, fetch them, compile, and release the lock

use crate::cache::{
    BuildFlags, BuildLease, BuildSlot, CacheDirectoryManager, CacheLayout, FileLockProvider,
    FsCacheDirectoryManager,
};
use crate::cancel::CancelSignal;
use crate::config::Config;
use crate::error::{KilnError, KilnResult};
use crate::packages::{
    extract_comments, CommentDirectiveExtractor, DirectiveExtractor, LocalPackageStore,
    MaxVersionResolver, ResolvedPackages, TransitiveResolver, VersionResolver,
};
use crate::toolchain::{
    ArtifactRunner, CommandCompiler, CommandRunner, CompileRequest, Compiler, PackageFetcher,
};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directory inside a cache directory that receives package libraries
pub const PACKAGES_DIR: &str = "packages";

/// What to build
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Source files, order matters for the fingerprint
    pub sources: Vec<PathBuf>,
    /// Allow unsafe code
    pub allow_unsafe: bool,
    /// Resolve dependencies of declared packages
    pub transitive: bool,
}

/// Result of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Artifact path inside the cache
    pub artifact: PathBuf,
    /// Whether a cached artifact was reused
    pub reused: bool,
}

/// A source file read into memory
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl SourceFile {
    /// Contents as text; invalid UTF-8 sequences become U+FFFD
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.contents)
    }
}

/// Validate the file list and read every source.
///
/// All missing files are reported in one error.
pub async fn read_sources(paths: &[PathBuf]) -> KilnResult<Vec<SourceFile>> {
    if paths.is_empty() {
        return Err(KilnError::NoSourceFiles);
    }

    let mut missing = Vec::new();
    for path in paths {
        let is_file = tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file());
        if !is_file {
            missing.push(path.clone());
        }
    }
    if !missing.is_empty() {
        return Err(KilnError::SourceFilesMissing { paths: missing });
    }

    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| KilnError::io(format!("reading source {}", path.display()), e))?;
        sources.push(SourceFile {
            path: path.clone(),
            contents,
        });
    }
    Ok(sources)
}

/// Build and run coordinator
pub struct Orchestrator {
    cache: Arc<dyn CacheDirectoryManager>,
    extractor: Arc<dyn DirectiveExtractor>,
    resolver: Arc<dyn VersionResolver>,
    transitive: Option<TransitiveResolver>,
    fetcher: Arc<dyn PackageFetcher>,
    compiler: Arc<dyn Compiler>,
    runner: Arc<dyn ArtifactRunner>,
    target_framework: Option<String>,
}

impl Orchestrator {
    /// Orchestrator with the default directive extractor and resolver
    pub fn new(
        cache: Arc<dyn CacheDirectoryManager>,
        fetcher: Arc<dyn PackageFetcher>,
        compiler: Arc<dyn Compiler>,
        runner: Arc<dyn ArtifactRunner>,
    ) -> Self {
        Self {
            cache,
            extractor: Arc::new(CommentDirectiveExtractor::default()),
            resolver: Arc::new(MaxVersionResolver),
            transitive: None,
            fetcher,
            compiler,
            runner,
            target_framework: None,
        }
    }

    /// Wire every component from configuration
    pub fn from_config(config: &Config) -> KilnResult<Self> {
        let locks = FileLockProvider::new(config.cache.lock_options());
        let cache = FsCacheDirectoryManager::new(config.cache.layout(), Arc::new(locks));

        let store = Arc::new(LocalPackageStore::new(
            config.packages.store_dir(),
            config.packages.library_extensions.clone(),
        ));
        let mut transitive = TransitiveResolver::new(store.clone());
        if let Some((name, version)) = config.packages.platform()? {
            transitive = transitive.with_platform(name, version);
        }

        let compiler = CommandCompiler::new(
            config.compiler.program.clone(),
            config.compiler.args.clone(),
            config.compiler.unsafe_args.clone(),
        );
        let runner = CommandRunner::new(
            config.runner.launcher().map(str::to_string),
            config.runner.args.clone(),
        );

        let orchestrator =
            Self::new(Arc::new(cache), store, Arc::new(compiler), Arc::new(runner))
                .with_extractor(Arc::new(CommentDirectiveExtractor::new(
                    config.packages.directive.clone(),
                )))
                .with_transitive(transitive);

        Ok(match &config.packages.target_framework {
            Some(framework) => orchestrator.with_target_framework(framework.clone()),
            None => orchestrator,
        })
    }

    /// Replace the directive extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn DirectiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Enable transitive resolution for requests that ask for it
    pub fn with_transitive(mut self, transitive: TransitiveResolver) -> Self {
        self.transitive = Some(transitive);
        self
    }

    /// Prefer `lib/<framework>/` when fetching packages
    pub fn with_target_framework(mut self, framework: impl Into<String>) -> Self {
        self.target_framework = Some(framework.into());
        self
    }

    /// Cache layout in use
    pub fn layout(&self) -> &CacheLayout {
        self.cache.layout()
    }

    /// Packages declared by `sources`, resolved to one version each
    pub async fn resolve_packages(
        &self,
        sources: &[SourceFile],
        transitive: bool,
        cancel: &CancelSignal,
    ) -> KilnResult<ResolvedPackages> {
        let comments: Vec<String> = sources
            .iter()
            .flat_map(|source| extract_comments(&source.text()))
            .collect();
        let references = self.extractor.extract(&comments);
        debug!("Found {} package directives", references.len());

        let direct = self.resolver.resolve(&references);
        if !transitive {
            return Ok(direct);
        }

        match &self.transitive {
            Some(resolver) => resolver.resolve(&direct, cancel).await,
            None => {
                warn!("Transitive resolution requested but no dependency source is configured");
                Ok(direct)
            }
        }
    }

    /// Build the sources, or reuse a cached artifact
    pub async fn build(
        &self,
        request: &BuildRequest,
        cancel: &CancelSignal,
    ) -> KilnResult<BuildOutcome> {
        let sources = read_sources(&request.sources).await?;
        let inputs: Vec<&[u8]> = sources.iter().map(|s| s.contents.as_slice()).collect();
        let flags = BuildFlags {
            allow_unsafe: request.allow_unsafe,
        };

        let lease = match self.cache.acquire_build_slot(&inputs, flags, cancel).await? {
            BuildSlot::Reuse { artifact } => {
                return Ok(BuildOutcome {
                    artifact,
                    reused: true,
                })
            }
            BuildSlot::Build(lease) => lease,
        };

        if let Err(e) = self.build_into(&lease, &sources, request, cancel).await {
            discard_artifact(lease.artifact()).await;
            lease.release();
            return Err(e);
        }

        info!(
            "Built {} into {}",
            lease.fingerprint().short(),
            lease.directory().display()
        );
        let artifact = lease.artifact().to_path_buf();
        lease.release();

        Ok(BuildOutcome {
            artifact,
            reused: false,
        })
    }

    /// Fetch packages and compile into a locked cache directory
    async fn build_into(
        &self,
        lease: &BuildLease,
        sources: &[SourceFile],
        request: &BuildRequest,
        cancel: &CancelSignal,
    ) -> KilnResult<()> {
        let packages = self
            .resolve_packages(sources, request.transitive, cancel)
            .await?;

        let libraries = if packages.is_empty() {
            Vec::new()
        } else {
            info!("Fetching packages: {}", packages);
            self.fetcher
                .fetch(
                    &packages,
                    self.target_framework.as_deref(),
                    &lease.directory().join(PACKAGES_DIR),
                    cancel,
                )
                .await?
        };

        let compile = CompileRequest {
            sources: request.sources.clone(),
            libraries,
            out_dir: lease.directory().to_path_buf(),
            artifact: lease.artifact().to_path_buf(),
            allow_unsafe: request.allow_unsafe,
        };
        self.compiler.compile(&compile, cancel).await?;

        if !tokio::fs::try_exists(lease.artifact()).await.unwrap_or(false) {
            return Err(KilnError::ArtifactMissing(lease.artifact().to_path_buf()));
        }
        Ok(())
    }

    /// Build or reuse, then execute with `args`; returns the program's exit code
    pub async fn run(
        &self,
        request: &BuildRequest,
        args: &[String],
        cancel: &CancelSignal,
    ) -> KilnResult<i32> {
        let outcome = self.build(request, cancel).await?;
        self.execute(&outcome.artifact, args, cancel).await
    }

    /// Execute an already built artifact
    pub async fn execute(
        &self,
        artifact: &Path,
        args: &[String],
        cancel: &CancelSignal,
    ) -> KilnResult<i32> {
        self.runner.run(artifact, args, cancel).await
    }
}

/// Remove whatever a failed build left at the artifact path
async fn discard_artifact(artifact: &Path) {
    match tokio::fs::remove_file(artifact).await {
        Ok(()) => debug!("Discarded partial artifact {}", artifact.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial artifact {}: {}", artifact.display(), e),
    }
}
