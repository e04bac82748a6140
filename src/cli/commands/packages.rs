//! Packages command - show what the sources declare

use crate::cancel::CancelSignal;
use crate::cli::args::{OutputFormat, PackagesArgs};
use crate::config::Config;
use crate::error::KilnResult;
use crate::orchestrator::{read_sources, Orchestrator};
use crate::packages::ResolvedPackages;

/// Execute the packages command
pub async fn execute(args: PackagesArgs, config: &Config, cancel: &CancelSignal) -> KilnResult<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let sources = read_sources(&args.files).await?;
    let transitive = args.transitive || config.packages.transitive;

    let packages = orchestrator
        .resolve_packages(&sources, transitive, cancel)
        .await?;

    match args.format {
        OutputFormat::Table => print_package_table(&packages),
        OutputFormat::Json => {
            let map: serde_json::Map<String, serde_json::Value> = packages
                .iter()
                .map(|(name, version)| (name.to_string(), version.to_string().into()))
                .collect();
            println!("{}", serde_json::to_string_pretty(&map)?);
        }
        OutputFormat::Plain => {
            for (name, version) in packages.iter() {
                println!("{} {}", name, version);
            }
        }
    }

    Ok(())
}

fn print_package_table(packages: &ResolvedPackages) {
    if packages.is_empty() {
        println!("No packages declared.");
        return;
    }

    let width = packages
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0)
        .max("PACKAGE".len());

    println!("{:<width$}  VERSION", "PACKAGE", width = width);
    for (name, version) in packages.iter() {
        println!("{:<width$}  {}", name, version, width = width);
    }
}
