//! Kiln - compile-and-run for single-file programs
//!
//! Compiles a set of source files into a content-addressed cache directory,
//! reusing the artifact whenever the same sources (and flags) come back.
//! Packages are declared in source comments and resolved from a local store.

pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod packages;
pub mod toolchain;
pub mod ui;

pub use error::{KilnError, KilnResult};
