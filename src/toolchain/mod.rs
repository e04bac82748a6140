//! Toolchain seams
//!
//! The orchestrator never talks to a compiler, package source or program
//! launcher directly. It goes through these traits so that tests can swap in
//! fakes and the CLI can wire command-backed implementations from config.

pub mod command;

pub use command::{build_error_output, CommandCompiler, CommandRunner};

use crate::cancel::CancelSignal;
use crate::error::KilnResult;
use crate::packages::ResolvedPackages;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Everything a compiler needs for one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// Source files, in the order given by the user
    pub sources: Vec<PathBuf>,
    /// Libraries from fetched packages
    pub libraries: Vec<PathBuf>,
    /// Cache directory the build writes into
    pub out_dir: PathBuf,
    /// Expected artifact path inside `out_dir`
    pub artifact: PathBuf,
    /// Whether unsafe code is allowed
    pub allow_unsafe: bool,
}

/// Turns sources and libraries into an artifact
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile and return the artifact path
    async fn compile(&self, request: &CompileRequest, cancel: &CancelSignal)
        -> KilnResult<PathBuf>;
}

/// Makes resolved packages available on disk
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// Place every package under `extract_dir` and return its library files
    async fn fetch(
        &self,
        packages: &ResolvedPackages,
        target_framework: Option<&str>,
        extract_dir: &Path,
        cancel: &CancelSignal,
    ) -> KilnResult<Vec<PathBuf>>;
}

/// Executes a built artifact
#[async_trait]
pub trait ArtifactRunner: Send + Sync {
    /// Run `artifact` with `args` and return its exit code
    async fn run(&self, artifact: &Path, args: &[String], cancel: &CancelSignal)
        -> KilnResult<i32>;
}
