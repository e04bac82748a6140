//! Status lines for consistent CLI formatting
//!
//! Everything here writes to stderr.

use super::context::UiContext;
use console::style;

/// Display a success step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        eprintln!("{} {} {}", style("✓").green(), message, style(detail).dim());
    } else {
        eprintln!("{} {} ({})", style("[OK]").green(), message, detail);
    }
}

/// Display an informational step
pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        eprintln!("{} {}", style("•").cyan(), message);
    } else {
        eprintln!("{} {}", style("[INFO]").cyan(), message);
    }
}

/// Display a warning with a follow-up hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        eprintln!("{} {}", style("!").yellow(), message);
        eprintln!("  {}", style(hint).dim());
    } else {
        eprintln!("{} {}", style("[WARN]").yellow(), message);
        eprintln!("  {}", hint);
    }
}

/// Display a dimmed remark
pub fn remark(_ctx: &UiContext, message: &str) {
    eprintln!("{}", style(message).dim());
}
