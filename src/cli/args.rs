//! CLI argument definitions using clap
//!
//! Commands:
//! - txcommit check-config --config <path>
//! - txcommit simulate --config <path> --workers <n> --commits <n>

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::observability::Severity;

/// txcommit - group commit engine for transaction coordinators
#[derive(Parser, Debug)]
#[command(name = "txcommit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Lowest log severity written to stdout/stderr
    #[arg(long, value_enum, default_value_t = LogLevel::Info, global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate a group commit config, then print it
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./groupcommit.json")]
        config: PathBuf,
    },

    /// Drive a committer with concurrent synthetic commits and print metrics
    Simulate {
        /// Path to configuration file
        #[arg(long, default_value = "./groupcommit.json")]
        config: PathBuf,

        /// Number of committing threads
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Commits per thread
        #[arg(long, default_value_t = 100)]
        commits: usize,

        /// Simulated flush latency per emission
        #[arg(long, default_value_t = 1)]
        emit_delay_ms: u64,

        /// Fail every n-th emission
        #[arg(long)]
        fail_every: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Severity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Severity::Trace,
            LogLevel::Info => Severity::Info,
            LogLevel::Warn => Severity::Warn,
            LogLevel::Error => Severity::Error,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
