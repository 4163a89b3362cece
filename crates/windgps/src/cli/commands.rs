//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Process command arguments.
#[derive(Debug, Args)]
pub struct ProcessCommand {
    /// Directory holding the capture's log files
    pub dir: PathBuf,

    /// Calendar year the capture was recorded in
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Database to store the run in
    #[arg(long, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Wind key to extract (repeatable; replaces the configured keys)
    #[arg(short, long = "key", value_name = "KEY")]
    pub keys: Vec<String>,

    /// Output the run summary as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Inspect command arguments.
#[derive(Debug, Args)]
pub struct InspectCommand {
    /// Log file to inspect
    pub file: PathBuf,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Stored run commands.
#[derive(Debug, Subcommand)]
pub enum RunsCommand {
    /// List stored runs, newest first
    List {
        /// Maximum number of runs
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show one stored run
    Show {
        /// Run id
        id: i64,

        /// Include the run's samples
        #[arg(short, long)]
        samples: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete a stored run and its samples
    Delete {
        /// Run id
        id: i64,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        file: Option<PathBuf>,
    },
}
