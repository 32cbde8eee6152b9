//! Command-line surface over the engine's pool operations (spec §6, SPEC_FULL §B).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kydras-storage")]
#[command(about = "Multi-drive replicated storage pool", long_about = None)]
pub struct Cli {
    /// Output results in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new storage pool
    CreatePool {
        /// Human-readable pool name
        #[arg(short, long)]
        name: String,

        /// Pool type: jbod|mirror|performance|archive|custom
        #[arg(short, long, default_value = "jbod")]
        kind: String,

        /// Drive roots to add immediately, each guessed as Hdd unless --ssd/--nvme given per-drive is needed later
        #[arg(long = "drive", num_args = 1..)]
        drives: Vec<PathBuf>,
    },

    /// Add a drive to an existing pool
    AddDrive {
        #[arg(short, long)]
        pool: String,

        #[arg(short, long)]
        root: PathBuf,

        #[arg(short, long)]
        label: String,

        /// Device class: hdd|ssd|nvme|network|removable
        #[arg(short = 'c', long, default_value = "hdd")]
        class: String,
    },

    /// Remove a drive from a pool (files are left in place)
    RemoveDrive {
        #[arg(short, long)]
        pool: String,

        #[arg(short, long)]
        label: String,
    },

    /// Add a placement rule to a pool
    AddRule {
        #[arg(short, long)]
        pool: String,

        /// Glob pattern, e.g. "**/*.mp4"
        #[arg(long)]
        pattern: String,

        #[arg(short, long, default_value_t = 1)]
        duplication: usize,

        #[arg(long)]
        target_drive: Option<String>,

        #[arg(long, default_value_t = false)]
        prefer_ssd: bool,

        #[arg(long)]
        max_size_bytes: Option<u64>,

        /// Preferred tier: hot|warm|cold
        #[arg(long)]
        tier: Option<String>,
    },

    /// List every pool the engine manages
    ListPools,

    /// Show a single pool's drives and rules
    ShowPool {
        #[arg(short, long)]
        pool: String,
    },

    /// Write a local file's content into the pool under a relative path
    Write {
        #[arg(short, long)]
        pool: String,

        #[arg(short, long)]
        rel_path: String,

        /// Local source file to read content from
        #[arg(short, long)]
        source: PathBuf,
    },

    /// Read a file from the pool to stdout, or to --dest if given
    Read {
        #[arg(short, long)]
        pool: String,

        #[arg(short, long)]
        rel_path: String,

        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Delete a file from every replica
    Delete {
        #[arg(short, long)]
        pool: String,

        #[arg(short, long)]
        rel_path: String,
    },

    /// Check whether a file exists anywhere in the pool
    Exists {
        #[arg(short, long)]
        pool: String,

        #[arg(short, long)]
        rel_path: String,
    },

    /// List relative paths in the pool matching a glob pattern
    List {
        #[arg(short, long)]
        pool: String,

        #[arg(long, default_value = "*")]
        pattern: String,
    },

    /// Reconcile the pool's replica counts to rule-required levels
    Rebalance {
        #[arg(short, long)]
        pool: String,
    },

    /// Probe a drive path's health without requiring pool membership
    CheckHealth {
        #[arg(short, long)]
        root: PathBuf,
    },
}
