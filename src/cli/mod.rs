//! CLI module for txcommit
//!
//! Provides command-line interface for:
//! - check-config: Load and validate a committer config
//! - simulate: Drive a committer with synthetic concurrent commits

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command, LogLevel};
pub use commands::{
    check_config, run, run_command, run_simulation, simulate, SimulateOptions, SimulationReport,
};
pub use errors::{CliError, CliErrorCode, CliResult};
