//! Group commit configuration
//!
//! All five tunables are required to be positive. Values are fixed for the
//! lifetime of a committer.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{GroupCommitError, GroupCommitResult};

/// Tunables for a [`GroupCommitter`](super::GroupCommitter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCommitConfig {
    /// Number of slots a normal group holds before its size is fixed.
    #[serde(default = "default_slot_capacity")]
    pub slot_capacity: usize,

    /// Age after which an open group is size-fixed even if under capacity.
    #[serde(default = "default_group_size_fix_timeout_millis")]
    pub group_size_fix_timeout_millis: u64,

    /// How long a not-ready slot may hold back a size-fixed group before it
    /// is moved into its own delayed group.
    #[serde(default = "default_delayed_slot_move_timeout_millis")]
    pub delayed_slot_move_timeout_millis: u64,

    /// Age after which any group that has not started emitting is aborted.
    #[serde(default = "default_old_group_abort_timeout_seconds")]
    pub old_group_abort_timeout_seconds: u64,

    /// Sweep interval of the background timeout workers.
    #[serde(default = "default_timeout_check_interval_millis")]
    pub timeout_check_interval_millis: u64,
}

fn default_slot_capacity() -> usize {
    20
}
fn default_group_size_fix_timeout_millis() -> u64 {
    40
}
fn default_delayed_slot_move_timeout_millis() -> u64 {
    1200
}
fn default_old_group_abort_timeout_seconds() -> u64 {
    60
}
fn default_timeout_check_interval_millis() -> u64 {
    20
}

impl Default for GroupCommitConfig {
    fn default() -> Self {
        Self {
            slot_capacity: default_slot_capacity(),
            group_size_fix_timeout_millis: default_group_size_fix_timeout_millis(),
            delayed_slot_move_timeout_millis: default_delayed_slot_move_timeout_millis(),
            old_group_abort_timeout_seconds: default_old_group_abort_timeout_seconds(),
            timeout_check_interval_millis: default_timeout_check_interval_millis(),
        }
    }
}

impl GroupCommitConfig {
    /// Create a configuration with every tunable given explicitly.
    pub fn new(
        slot_capacity: usize,
        group_size_fix_timeout_millis: u64,
        delayed_slot_move_timeout_millis: u64,
        old_group_abort_timeout_seconds: u64,
        timeout_check_interval_millis: u64,
    ) -> Self {
        Self {
            slot_capacity,
            group_size_fix_timeout_millis,
            delayed_slot_move_timeout_millis,
            old_group_abort_timeout_seconds,
            timeout_check_interval_millis,
        }
    }

    /// Load configuration from a JSON file and validate it.
    ///
    /// Missing fields fall back to their defaults.
    pub fn load(path: &Path) -> GroupCommitResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GroupCommitError::invalid_config(format!(
                "Failed to read config '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: GroupCommitConfig = serde_json::from_str(&content).map_err(|e| {
            GroupCommitError::invalid_config(format!("Invalid config JSON: {}", e))
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Reject non-positive values.
    pub fn validate(&self) -> GroupCommitResult<()> {
        if self.slot_capacity == 0 {
            return Err(GroupCommitError::invalid_config("slot_capacity must be > 0"));
        }

        let windows = [
            ("group_size_fix_timeout_millis", self.group_size_fix_timeout_millis),
            ("delayed_slot_move_timeout_millis", self.delayed_slot_move_timeout_millis),
            ("old_group_abort_timeout_seconds", self.old_group_abort_timeout_seconds),
            ("timeout_check_interval_millis", self.timeout_check_interval_millis),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(GroupCommitError::invalid_config(format!(
                    "{} must be > 0",
                    name
                )));
            }
        }

        Ok(())
    }

    pub fn group_size_fix_timeout(&self) -> Duration {
        Duration::from_millis(self.group_size_fix_timeout_millis)
    }

    pub fn delayed_slot_move_timeout(&self) -> Duration {
        Duration::from_millis(self.delayed_slot_move_timeout_millis)
    }

    pub fn old_group_abort_timeout(&self) -> Duration {
        Duration::from_secs(self.old_group_abort_timeout_seconds)
    }

    pub fn timeout_check_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_check_interval_millis)
    }
}
