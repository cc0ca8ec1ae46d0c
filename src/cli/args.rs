//! CLI argument parsing using clap.
//!
//! Contains the `Cli` struct, `Commands` enum, and subcommand enums. Each
//! flag maps to one `TraceOptions` field (spec §6); CLI flags, where
//! present, override the loaded config.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-language semantic input-tracer.
#[derive(Parser)]
#[command(name = "tainttrace")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Finds untrusted input sources and traces their flow through a codebase")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a custom settings.toml file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a .tainttrace/settings.toml configuration file.
    Init {
        /// Force overwrite an existing configuration file.
        #[arg(short, long)]
        force: bool,
    },

    /// Show the active configuration.
    Config,

    /// Forward-trace input sources to their sinks across a codebase.
    Trace {
        /// Root directory to analyze.
        path: PathBuf,

        /// Output format.
        #[arg(short = 'f', long, default_value = "json")]
        format: String,

        /// Write the report to this path instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Restrict analysis to these languages (repeatable).
        #[arg(long)]
        language: Vec<String>,

        /// Maximum recursion depth in flow tracing.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Hard cap on files analyzed.
        #[arg(long)]
        max_files: Option<usize>,

        /// Heap watermark (MiB) at which shedding engages.
        #[arg(long)]
        max_memory_mb: Option<u64>,

        /// Do not cross call edges into callee functions.
        #[arg(long)]
        no_follow_imports: bool,

        /// Emit phase-progress diagnostics.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Trace a single expression backward to its possible sources.
    Backward {
        /// Root directory to analyze.
        path: PathBuf,

        /// The expression to trace, e.g. "$id" or "userId".
        target: String,

        /// Maximum recursion depth.
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Discover framework-carrier classes/methods that carry user input.
    Carriers {
        /// Root directory to analyze.
        path: PathBuf,

        /// Write the carrier map to this path instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Expand every call path reachable from a starting function (C9).
    Paths {
        /// Root directory to analyze.
        path: PathBuf,

        /// File containing the starting function, relative to `path` or absolute.
        file: PathBuf,

        /// Name of the function/method to start expanding from.
        function: String,

        /// Maximum recursion depth.
        #[arg(long)]
        max_depth: Option<usize>,

        /// Stop once this many complete paths have been found.
        #[arg(long, default_value_t = 20)]
        max_paths: usize,

        /// Write the result to this path instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
