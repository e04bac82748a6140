//! Command-backed compiler and runner
//!
//! Both shell out through `tokio::process` with `kill_on_drop`, so dropping
//! the wait future on cancellation also kills the child.

use crate::cancel::CancelSignal;
use crate::error::{KilnError, KilnResult};
use crate::toolchain::{ArtifactRunner, CompileRequest, Compiler};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Maximum number of output lines kept in a compile failure
const ERROR_TAIL_LINES: usize = 50;

/// Keep the last lines of combined compiler output
pub fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Placeholder replaced by the artifact path
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";
/// Placeholder replaced by the cache directory
pub const OUT_DIR_PLACEHOLDER: &str = "{out_dir}";
/// Argument repeated once per source path
pub const SOURCES_PLACEHOLDER: &str = "{sources}";
/// Argument repeated once per library path
pub const LIBRARIES_PLACEHOLDER: &str = "{libraries}";

/// One argument per path, or none when `paths` is empty
fn expand_each<'a>(
    template: &'a str,
    placeholder: &'a str,
    paths: &'a [PathBuf],
) -> impl Iterator<Item = String> + 'a {
    paths
        .iter()
        .map(move |p| template.replace(placeholder, &p.display().to_string()))
}

/// Runs a configured compiler program
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    program: String,
    args: Vec<String>,
    unsafe_args: Vec<String>,
}

impl CommandCompiler {
    /// Create a compiler invoking `program` with templated `args`
    pub fn new(program: impl Into<String>, args: Vec<String>, unsafe_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            unsafe_args,
        }
    }

    /// Expand placeholders into the final argument list
    pub fn expand_args(&self, request: &CompileRequest) -> Vec<String> {
        let artifact = request.artifact.display().to_string();
        let out_dir = request.out_dir.display().to_string();

        let mut expanded = Vec::with_capacity(self.args.len() + request.sources.len());
        for arg in &self.args {
            let arg = arg
                .replace(ARTIFACT_PLACEHOLDER, &artifact)
                .replace(OUT_DIR_PLACEHOLDER, &out_dir);

            if arg.contains(SOURCES_PLACEHOLDER) {
                expanded.extend(expand_each(&arg, SOURCES_PLACEHOLDER, &request.sources));
            } else if arg.contains(LIBRARIES_PLACEHOLDER) {
                expanded.extend(expand_each(&arg, LIBRARIES_PLACEHOLDER, &request.libraries));
            } else {
                expanded.push(arg);
            }
        }

        if request.allow_unsafe {
            expanded.extend(self.unsafe_args.iter().cloned());
        }
        expanded
    }
}

#[async_trait]
impl Compiler for CommandCompiler {
    async fn compile(
        &self,
        request: &CompileRequest,
        cancel: &CancelSignal,
    ) -> KilnResult<PathBuf> {
        let args = self.expand_args(request);
        debug!("Executing: {} {:?}", self.program, args);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KilnError::command_failed(&self.program, e))?;

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| KilnError::command_failed(&self.program, e))?
            }
            _ = cancel.cancelled() => {
                info!("Compilation cancelled, compiler killed");
                return Err(KilnError::Cancelled);
            }
        };

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KilnError::CompileFailed {
                program: self.program.clone(),
                code: output.status.code().unwrap_or(-1),
                output: build_error_output(&stdout, &stderr),
            });
        }

        let exists = tokio::fs::try_exists(&request.artifact)
            .await
            .map_err(|e| KilnError::io(format!("checking {}", request.artifact.display()), e))?;
        if !exists {
            return Err(KilnError::ArtifactMissing(request.artifact.clone()));
        }

        Ok(request.artifact.clone())
    }
}

/// Runs an artifact, optionally through a launcher program
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    launcher: Option<String>,
    launcher_args: Vec<String>,
}

impl CommandRunner {
    /// Run artifacts as `<launcher> <launcher_args>... <artifact> <args>...`,
    /// or directly when no launcher is set
    pub fn new(launcher: Option<String>, launcher_args: Vec<String>) -> Self {
        Self {
            launcher,
            launcher_args,
        }
    }

    fn command(&self, artifact: &Path, args: &[String]) -> Command {
        let mut command = match &self.launcher {
            Some(launcher) => {
                let mut command = Command::new(launcher);
                command.args(&self.launcher_args).arg(artifact);
                command
            }
            None => Command::new(artifact),
        };
        command.args(args);
        command
    }
}

#[async_trait]
impl ArtifactRunner for CommandRunner {
    async fn run(
        &self,
        artifact: &Path,
        args: &[String],
        cancel: &CancelSignal,
    ) -> KilnResult<i32> {
        debug!("Running {} {:?}", artifact.display(), args);

        let mut child = self
            .command(artifact, args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KilnError::command_failed(artifact.display().to_string(), e))?;

        let status = tokio::select! {
            status = child.wait() => {
                status.map_err(|e| KilnError::command_failed(artifact.display().to_string(), e))?
            }
            _ = cancel.cancelled() => return Err(KilnError::Cancelled),
        };

        Ok(status.code().unwrap_or(-1))
    }
}
