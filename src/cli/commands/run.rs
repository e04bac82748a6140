//! Run command - build or reuse, then execute

use super::build::{build_request, build_with_progress};
use crate::cancel::CancelSignal;
use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::error::KilnResult;
use crate::orchestrator::Orchestrator;
use tracing::debug;

/// Execute the run command, returning the program's exit code
pub async fn execute(args: RunArgs, config: &Config, cancel: &CancelSignal) -> KilnResult<i32> {
    let orchestrator = Orchestrator::from_config(config)?;
    let request = build_request(&args.source, config);

    let outcome = build_with_progress(&orchestrator, &request, cancel).await?;
    debug!(
        "Running {} ({})",
        outcome.artifact.display(),
        if outcome.reused { "cached" } else { "fresh" }
    );

    orchestrator
        .execute(&outcome.artifact, &args.args, cancel)
        .await
}
