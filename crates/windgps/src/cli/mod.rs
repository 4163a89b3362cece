//! Command-line interface for windgps.
//!
//! This module provides the CLI structure for the `windgps` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, InspectCommand, ProcessCommand, RunsCommand};

use crate::logging::Verbosity;

/// windgps - Decode wind/GPS logger captures
///
/// Reads the binary block files written by the wind/GPS logger, repairs
/// counter and date glitches, and reconstructs a UTC timeline for every
/// sample.
#[derive(Debug, Parser)]
#[command(name = "windgps")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a capture directory and store the timeline
    Process(ProcessCommand),

    /// Discover the block layout of one log file
    Inspect(InspectCommand),

    /// Browse stored runs
    #[command(subcommand)]
    Runs(RunsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "windgps");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(parse(&["windgps", "-q", "config", "path"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["windgps", "config", "path"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["windgps", "-v", "config", "path"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["windgps", "-vv", "config", "path"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_process() {
        let cli = parse(&[
            "windgps", "process", "/data/run1", "--year", "2021", "--db", "/tmp/w.db", "-k",
            "S2", "--key", "D", "--json",
        ]);
        let Command::Process(cmd) = cli.command else {
            panic!("expected process command");
        };
        assert_eq!(cmd.dir, PathBuf::from("/data/run1"));
        assert_eq!(cmd.year, Some(2021));
        assert_eq!(cmd.db, Some(PathBuf::from("/tmp/w.db")));
        assert_eq!(cmd.keys, vec!["S2", "D"]);
        assert!(cmd.json);
    }

    #[test]
    fn test_parse_process_defaults() {
        let Command::Process(cmd) = parse(&["windgps", "process", "."]).command else {
            panic!("expected process command");
        };
        assert!(cmd.year.is_none());
        assert!(cmd.keys.is_empty());
        assert!(!cmd.json);
    }

    #[test]
    fn test_parse_process_requires_dir() {
        assert!(Cli::try_parse_from(["windgps", "process"]).is_err());
    }

    #[test]
    fn test_parse_inspect() {
        let Command::Inspect(cmd) = parse(&["windgps", "inspect", "LOG00001.bin", "-j"]).command
        else {
            panic!("expected inspect command");
        };
        assert_eq!(cmd.file, PathBuf::from("LOG00001.bin"));
        assert!(cmd.json);
    }

    #[test]
    fn test_parse_runs() {
        let cli = parse(&["windgps", "runs", "list", "--limit", "5"]);
        assert!(matches!(
            cli.command,
            Command::Runs(RunsCommand::List { limit: 5, json: false })
        ));

        let cli = parse(&["windgps", "runs", "show", "7", "--samples"]);
        assert!(matches!(
            cli.command,
            Command::Runs(RunsCommand::Show { id: 7, samples: true, .. })
        ));

        let cli = parse(&["windgps", "runs", "delete", "7"]);
        assert!(matches!(cli.command, Command::Runs(RunsCommand::Delete { id: 7 })));
    }

    #[test]
    fn test_parse_config() {
        let cli = parse(&["windgps", "config", "show", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Show { json: true })
        ));

        let cli = parse(&["windgps", "config", "validate", "/etc/windgps.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["windgps", "-c", "/custom/config.toml", "config", "path"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
