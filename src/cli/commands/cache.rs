//! Cache command - inspect and prune the build cache

use crate::cache::{format_bytes, CacheEntry, CacheInventory, CacheState, RemovalReport};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::KilnResult;
use crate::ui::{self, UiContext};
use console::style;
use std::io::{self, Write};

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> KilnResult<()> {
    let inventory = CacheInventory::new(config.cache.layout());

    match args.action {
        CacheAction::List { format } => list_entries(&inventory, format).await,
        CacheAction::Path => {
            println!("{}", inventory.root().display());
            Ok(())
        }
        CacheAction::Gc { days, dry_run } => gc_entries(&inventory, config, days, dry_run).await,
        CacheAction::Clear { yes } => clear_entries(&inventory, yes).await,
    }
}

/// List all cached builds
async fn list_entries(inventory: &CacheInventory, format: OutputFormat) -> KilnResult<()> {
    let entries = inventory.entries().await?;

    match format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for entry in &entries {
                println!("{}", entry.path.display());
            }
        }
    }

    Ok(())
}

fn print_entry_table(entries: &[CacheEntry]) {
    if entries.is_empty() {
        println!("No cached builds found.");
        return;
    }

    println!("{:<14} {:<10} {:>10} {:<20}", "BUILD", "STATE", "SIZE", "MODIFIED");
    println!("{}", "-".repeat(58));

    for entry in entries {
        let state_display = match entry.state {
            CacheState::Complete => style("complete").green().to_string(),
            CacheState::Building => style("building").yellow().to_string(),
            CacheState::Stale => style("stale").dim().to_string(),
        };
        // Styled text carries escape codes, so pad the plain width by hand.
        let padding = " ".repeat(10usize.saturating_sub(entry.state.to_string().len()));

        println!(
            "{:<14} {}{} {:>10} {:<20}",
            &entry.fingerprint[..12.min(entry.fingerprint.len())],
            state_display,
            padding,
            format_bytes(entry.size_bytes),
            entry.modified.format("%Y-%m-%d %H:%M")
        );
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!();
    println!("Total: {} build(s), {}", entries.len(), format_bytes(total));
}

/// Remove stale builds and builds older than the configured age
async fn gc_entries(
    inventory: &CacheInventory,
    config: &Config,
    days_override: Option<u32>,
    dry_run: bool,
) -> KilnResult<()> {
    let gc_days = days_override.unwrap_or(config.cache.gc_days);
    if gc_days == 0 {
        ui::step_info(
            &UiContext::detect(),
            "Age-based removal is disabled (gc_days = 0); removing stale builds only",
        );
    }

    let report = inventory.gc(gc_days, dry_run).await?;
    if report.removed.is_empty() && report.busy.is_empty() {
        println!("Nothing to remove.");
        return Ok(());
    }

    let verb = if dry_run { "Would remove" } else { "Removed" };
    print_report(&report, verb);

    if dry_run {
        ui::remark(&UiContext::detect(), "Dry run - no builds removed.");
    }
    Ok(())
}

/// Remove every build that is not in progress
async fn clear_entries(inventory: &CacheInventory, skip_confirm: bool) -> KilnResult<()> {
    let entries = inventory.entries().await?;
    if entries.is_empty() {
        println!("No cached builds to clear.");
        return Ok(());
    }

    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    println!(
        "This will remove {} cached build(s) ({}) from {}",
        entries.len(),
        format_bytes(total),
        inventory.root().display()
    );

    let ctx = UiContext::detect().with_auto_yes(skip_confirm);
    if !ctx.auto_yes() {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = inventory.clear().await?;
    print_report(&report, "Removed");
    Ok(())
}

fn print_report(report: &RemovalReport, verb: &str) {
    for path in &report.removed {
        println!("  {} {}", style("•").red(), path.display());
    }
    for path in &report.busy {
        println!("  {} {} (build in progress)", style("•").yellow(), path.display());
    }

    println!(
        "{} {} {} build(s), freed {}{}",
        style("✓").green(),
        verb,
        report.removed.len(),
        format_bytes(report.freed_bytes),
        if report.busy.is_empty() {
            String::new()
        } else {
            format!(", skipped {} busy", report.busy.len())
        }
    );
}
