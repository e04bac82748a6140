//! Kiln - compile-and-run for single-file programs
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use kiln::cancel::{cancel_pair, CancelSignal};
use kiln::cli::{Cli, Commands};
use kiln::config::{Config, ConfigManager};
use kiln::error::KilnResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Conventional exit code for a run interrupted by Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) if e.is_cancellation() => {
            debug!("{}", e);
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> KilnResult<i32> {
    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    let cancel = install_interrupt_handler();

    match cli.command {
        Commands::Run(args) => kiln::cli::commands::run(args, &config, &cancel).await,
        Commands::Build(args) => {
            kiln::cli::commands::build(args, &config, &cancel).await?;
            Ok(0)
        }
        Commands::Packages(args) => {
            kiln::cli::commands::packages(args, &config, &cancel).await?;
            Ok(0)
        }
        Commands::Cache(args) => {
            kiln::cli::commands::cache(args, &config).await?;
            Ok(0)
        }
        Commands::Config(args) => {
            kiln::cli::commands::config(args, &config, &config_manager).await?;
            Ok(0)
        }
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug; `RUST_LOG` is not consulted
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("kiln=warn"),
        1 => EnvFilter::new("kiln=info"),
        _ => EnvFilter::new("kiln=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}

/// Ctrl-C cancels lock waits, package fetches and the compiler
fn install_interrupt_handler() -> CancelSignal {
    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received, cancelling");
            handle.cancel();
        }
    });
    signal
}
