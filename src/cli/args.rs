//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Kiln - compile-and-run for single-file programs
///
/// Compiles source files once, caches the artifact by content, and runs it.
/// Packages are declared in source comments (`// Package: Name 1.2.3`).
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (or reuse) and execute a program
    Run(RunArgs),

    /// Build (or reuse) without executing
    Build(BuildArgs),

    /// Show the packages declared by source files
    Packages(PackagesArgs),

    /// Manage the build cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Flags shared by commands that compile
#[derive(Parser, Debug, Clone)]
pub struct SourceArgs {
    /// Allow unsafe code
    #[arg(long, alias = "allowUnsafe")]
    pub allow_unsafe: bool,

    /// Also resolve dependencies of declared packages
    #[arg(long)]
    pub transitive: bool,

    /// Source files, in compilation order
    pub files: Vec<PathBuf>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Arguments passed to the program
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output format
    #[arg(short, long, default_value = "plain")]
    pub format: OutputFormat,
}

/// Arguments for the packages command
#[derive(Parser, Debug)]
pub struct PackagesArgs {
    /// Also resolve dependencies of declared packages
    #[arg(long)]
    pub transitive: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    /// Source files to scan
    pub files: Vec<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached builds
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the cache directory
    Path,

    /// Remove builds older than N days
    Gc {
        /// Remove builds older than N days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove every cached build that is not being built
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_with_program_args() {
        let cli = Cli::parse_from([
            "kiln",
            "run",
            "--allow-unsafe",
            "Program.cs",
            "Util.cs",
            "--",
            "-x",
            "input.txt",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert!(args.source.allow_unsafe);
                assert!(!args.source.transitive);
                assert_eq!(
                    args.source.files,
                    vec![PathBuf::from("Program.cs"), PathBuf::from("Util.cs")]
                );
                assert_eq!(args.args, vec!["-x", "input.txt"]);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_accepts_legacy_unsafe_spelling() {
        let cli = Cli::parse_from(["kiln", "build", "--allowUnsafe", "a.cs"]);
        match cli.command {
            Commands::Build(args) => assert!(args.source.allow_unsafe),
            _ => panic!("expected Build command"),
        }
    }

    #[test]
    fn cli_run_without_files_parses() {
        let cli = Cli::parse_from(["kiln", "run"]);
        match cli.command {
            Commands::Run(args) => assert!(args.source.files.is_empty()),
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_cache_gc() {
        let cli = Cli::parse_from(["kiln", "cache", "gc", "--days", "7", "--dry-run"]);
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Gc { days, dry_run },
            }) => {
                assert_eq!(days, Some(7));
                assert!(dry_run);
            }
            _ => panic!("expected cache gc"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["kiln", "-vv", "--config", "/tmp/k.toml", "config", "path"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/k.toml")));
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Path)
            })
        ));
    }

    #[test]
    fn cli_parses_packages_format() {
        let cli = Cli::parse_from(["kiln", "packages", "--format", "json", "a.cs"]);
        match cli.command {
            Commands::Packages(args) => {
                assert_eq!(args.format, OutputFormat::Json);
                assert_eq!(args.files, vec![PathBuf::from("a.cs")]);
            }
            _ => panic!("expected Packages command"),
        }
    }
}
