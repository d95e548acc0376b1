//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// MalGuard: signature-based malware detection and quarantine
#[derive(Parser, Debug)]
#[command(name = "malguard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan files or directories
    Scan {
        /// Path(s) to scan
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Scan every file regardless of extension
        #[arg(short, long)]
        all_types: bool,

        /// Do not expand archive contents
        #[arg(long)]
        no_archives: bool,
    },

    /// Manage the signature database
    Signature {
        #[command(subcommand)]
        action: SignatureAction,
    },

    /// Manage quarantined items
    Quarantine {
        #[command(subcommand)]
        action: QuarantineAction,
    },

    /// View scan history
    History {
        /// Maximum entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Show detections only
        #[arg(short, long)]
        detected: bool,

        /// Clear the history log
        #[arg(long, conflicts_with_all = ["limit", "detected"])]
        clear: bool,
    },

    /// Show application information
    Info,
}

/// Signature database subcommands.
#[derive(Subcommand, Debug)]
pub enum SignatureAction {
    /// Register a signature by digest or by hashing a file
    Add {
        /// SHA-256 digest, or a file path with --from-file
        target: String,

        /// Hash the given file instead of taking a literal digest
        #[arg(long)]
        from_file: bool,

        /// Malware name
        #[arg(short, long)]
        name: String,

        /// Severity (low, medium, high, critical)
        #[arg(short, long, default_value = "medium")]
        severity: String,

        /// Signature source label
        #[arg(long, default_value = "manual")]
        source: String,
    },

    /// Remove a signature by digest
    Remove {
        /// SHA-256 digest
        digest: String,
    },

    /// List registered signatures
    List {
        /// Entries to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Search signatures by name or digest substring
    Search {
        /// Search text
        text: String,
    },

    /// Import signatures from a snapshot file
    Import {
        /// Snapshot file path
        path: PathBuf,

        /// Skip digests that are already registered
        #[arg(long)]
        skip_existing: bool,
    },

    /// Export the full signature snapshot
    Export {
        /// Destination file path
        path: PathBuf,
    },
}

/// Quarantine subcommands.
#[derive(Subcommand, Debug)]
pub enum QuarantineAction {
    /// List quarantined items
    List,

    /// Restore a quarantined item by digest prefix
    Restore {
        /// Digest prefix identifying the item
        digest: String,

        /// Restore to this path instead of the original location
        #[arg(short, long)]
        to: Option<PathBuf>,
    },

    /// Delete a quarantined item permanently by digest prefix
    Delete {
        /// Digest prefix identifying the item
        digest: String,
    },

    /// Delete all quarantined items
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
