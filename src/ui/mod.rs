//! Terminal output helpers
//!
//! Spinners and status symbols in an interactive terminal, plain tagged lines
//! (`[OK]`, `[WARN]`) in CI. All of it goes to stderr so that stdout carries
//! only command results and the output of the program being run.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{remark, step_info, step_ok_detail, step_warn_hint};
pub use progress::TaskSpinner;
