//! Build command - compile or reuse without executing

use crate::cancel::CancelSignal;
use crate::cli::args::{BuildArgs, OutputFormat, SourceArgs};
use crate::config::Config;
use crate::error::KilnResult;
use crate::orchestrator::{BuildOutcome, BuildRequest, Orchestrator};
use crate::ui::{TaskSpinner, UiContext};

/// Turn command-line source flags into a build request
pub(crate) fn build_request(source: &SourceArgs, config: &Config) -> BuildRequest {
    BuildRequest {
        sources: source.files.clone(),
        allow_unsafe: source.allow_unsafe,
        transitive: source.transitive || config.packages.transitive,
    }
}

/// Build with a spinner; the spinner is cleared before returning
pub(crate) async fn build_with_progress(
    orchestrator: &Orchestrator,
    request: &BuildRequest,
    cancel: &CancelSignal,
) -> KilnResult<BuildOutcome> {
    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Compiling {} file(s)...", request.sources.len()));

    match orchestrator.build(request, cancel).await {
        Ok(outcome) => {
            if outcome.reused {
                spinner.clear();
            } else {
                spinner.stop("Compiled");
            }
            Ok(outcome)
        }
        Err(e) if e.is_cancellation() => {
            spinner.clear();
            Err(e)
        }
        Err(e) => {
            spinner.stop_error("Build failed");
            Err(e)
        }
    }
}

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config, cancel: &CancelSignal) -> KilnResult<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let request = build_request(&args.source, config);

    let outcome = build_with_progress(&orchestrator, &request, cancel).await?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "artifact": outcome.artifact,
                "reused": outcome.reused,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            println!("{:<8} {}", "REUSED", "ARTIFACT");
            println!("{:<8} {}", outcome.reused, outcome.artifact.display());
        }
        OutputFormat::Plain => {
            let status = if outcome.reused { "reused" } else { "built" };
            println!("{} {}", status, outcome.artifact.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn config_enables_transitive_resolution() {
        let source = SourceArgs {
            allow_unsafe: true,
            transitive: false,
            files: vec![PathBuf::from("a.cs")],
        };
        let mut config = Config::default();

        let request = build_request(&source, &config);
        assert!(request.allow_unsafe);
        assert!(!request.transitive);

        config.packages.transitive = true;
        assert!(build_request(&source, &config).transitive);
    }
}
