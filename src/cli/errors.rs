//! CLI-specific error types

use std::fmt;
use std::io;

use crate::groupcommit::GroupCommitError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// The committer could not be driven
    SimulationFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "TXCOMMIT_CLI_CONFIG_ERROR",
            Self::IoError => "TXCOMMIT_CLI_IO_ERROR",
            Self::SimulationFailed => "TXCOMMIT_CLI_SIMULATION_FAILED",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn simulation_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::SimulationFailed, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<GroupCommitError> for CliError {
    fn from(e: GroupCommitError) -> Self {
        match e {
            GroupCommitError::InvalidConfig(message) => Self::config_error(message),
            other => Self::simulation_failed(other.to_string()),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = CliError::config_error("slot_capacity must be > 0");
        assert_eq!(
            err.to_string(),
            "TXCOMMIT_CLI_CONFIG_ERROR: slot_capacity must be > 0"
        );
    }

    #[test]
    fn test_group_commit_errors_map_to_codes() {
        let err: CliError = GroupCommitError::invalid_config("bad").into();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
        assert_eq!(err.message(), "bad");

        let err: CliError = GroupCommitError::Closed.into();
        assert_eq!(err.code(), &CliErrorCode::SimulationFailed);
    }
}
