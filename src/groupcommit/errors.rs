//! Group commit error types
//!
//! Error codes:
//! - GROUP_COMMIT_UNKNOWN_KEY
//! - GROUP_COMMIT_DUPLICATE_KEY
//! - GROUP_COMMIT_ALREADY_READY
//! - GROUP_COMMIT_ILLEGAL_STATE
//! - GROUP_COMMIT_EMIT_FAILED
//! - GROUP_COMMIT_EMITTER_NOT_SET
//! - GROUP_COMMIT_ABORTED
//! - GROUP_COMMIT_CLOSED
//! - GROUP_COMMIT_INVALID_CONFIG
//! - GROUP_COMMIT_INVALID_KEY
//! - GROUP_COMMIT_WORKER_SPAWN_FAILED
//!
//! Errors are cloneable: a single emission outcome is handed to every
//! caller blocked on the same group.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use super::group::GroupState;

/// Error returned by an [`Emittable`](super::Emittable) implementation.
pub type EmitError = Box<dyn StdError + Send + Sync>;

/// Result type for group commit operations
pub type GroupCommitResult<T> = Result<T, GroupCommitError>;

/// Group commit errors
#[derive(Debug, Clone, Error)]
pub enum GroupCommitError {
    // ==================
    // Caller Errors
    // ==================
    /// No live slot exists for the key (never reserved, removed, or already emitted)
    #[error("No live slot for key '{full_key}'")]
    UnknownKey { full_key: String },

    /// The child key is already reserved in the target group
    #[error("Slot '{full_key}' is already reserved")]
    DuplicateKey { full_key: String },

    /// `ready` was called twice for one slot
    #[error("Slot '{full_key}' is already ready")]
    AlreadyReady { full_key: String },

    /// The owning group can no longer be altered
    #[error("Slot '{full_key}' cannot be changed while its group is {state}: {reason}")]
    IllegalState {
        full_key: String,
        state: GroupState,
        reason: &'static str,
    },

    /// The full key could not be decomposed by the key manipulator
    #[error("Malformed full key '{0}'")]
    InvalidKey(String),

    // ==================
    // Batch Outcomes
    // ==================
    /// The emitter failed for the group identified by `emit_key`
    #[error("Emission failed for group '{emit_key}': {source}")]
    EmitFailed {
        emit_key: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    /// The group became ready before any emitter was installed
    #[error("No emitter installed when group '{emit_key}' became ready")]
    EmitterNotSet { emit_key: String },

    /// The group outlived the old-group abort timeout
    #[error("Group '{key}' was aborted after exceeding the abort timeout")]
    Aborted { key: String },

    /// The committer has been shut down
    #[error("Group committer is closed")]
    Closed,

    // ==================
    // Configuration
    // ==================
    /// Configuration could not be loaded or failed validation
    #[error("Invalid group commit config: {0}")]
    InvalidConfig(String),

    /// A background timeout worker could not be started
    #[error("Failed to start worker '{worker}': {message}")]
    WorkerSpawn { worker: String, message: String },
}

impl GroupCommitError {
    /// Wrap an emitter failure.
    pub fn emit_failed(emit_key: impl Into<String>, source: EmitError) -> Self {
        Self::EmitFailed {
            emit_key: emit_key.into(),
            source: Arc::from(source),
        }
    }

    /// Configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownKey { .. } => "GROUP_COMMIT_UNKNOWN_KEY",
            Self::DuplicateKey { .. } => "GROUP_COMMIT_DUPLICATE_KEY",
            Self::AlreadyReady { .. } => "GROUP_COMMIT_ALREADY_READY",
            Self::IllegalState { .. } => "GROUP_COMMIT_ILLEGAL_STATE",
            Self::InvalidKey(_) => "GROUP_COMMIT_INVALID_KEY",
            Self::EmitFailed { .. } => "GROUP_COMMIT_EMIT_FAILED",
            Self::EmitterNotSet { .. } => "GROUP_COMMIT_EMITTER_NOT_SET",
            Self::Aborted { .. } => "GROUP_COMMIT_ABORTED",
            Self::Closed => "GROUP_COMMIT_CLOSED",
            Self::InvalidConfig(_) => "GROUP_COMMIT_INVALID_CONFIG",
            Self::WorkerSpawn { .. } => "GROUP_COMMIT_WORKER_SPAWN_FAILED",
        }
    }

    /// Whether this error is the shared outcome of a whole group rather
    /// than a mistake in the individual call.
    pub fn is_batch_failure(&self) -> bool {
        matches!(
            self,
            Self::EmitFailed { .. } | Self::EmitterNotSet { .. } | Self::Aborted { .. } | Self::Closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_prefixed() {
        let errors = [
            GroupCommitError::UnknownKey { full_key: "0000:a".into() },
            GroupCommitError::DuplicateKey { full_key: "0000:a".into() },
            GroupCommitError::AlreadyReady { full_key: "0000:a".into() },
            GroupCommitError::IllegalState {
                full_key: "0000:a".into(),
                state: GroupState::Ready,
                reason: "group is emitting",
            },
            GroupCommitError::InvalidKey("nope".into()),
            GroupCommitError::emit_failed("0000", "disk full".into()),
            GroupCommitError::EmitterNotSet { emit_key: "0000".into() },
            GroupCommitError::Aborted { key: "0000".into() },
            GroupCommitError::Closed,
            GroupCommitError::invalid_config("slot_capacity must be > 0"),
        ];

        for err in errors {
            assert!(err.code().starts_with("GROUP_COMMIT_"), "{}", err.code());
        }
    }

    #[test]
    fn test_batch_failures() {
        assert!(GroupCommitError::emit_failed("0000", "boom".into()).is_batch_failure());
        assert!(GroupCommitError::Aborted { key: "0000".into() }.is_batch_failure());
        assert!(GroupCommitError::Closed.is_batch_failure());
        assert!(!GroupCommitError::UnknownKey { full_key: "0000:a".into() }.is_batch_failure());
        assert!(!GroupCommitError::invalid_config("x").is_batch_failure());
    }

    #[test]
    fn test_emit_failed_keeps_source() {
        let err = GroupCommitError::emit_failed("0000", "Something is wrong".into());
        let display = err.to_string();
        assert!(display.contains("0000"));
        assert!(display.contains("Something is wrong"));

        let source = StdError::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Something is wrong"));
    }

    #[test]
    fn test_cloned_outcome_shares_source() {
        let err = GroupCommitError::emit_failed("0000", "boom".into());
        let cloned = err.clone();
        match (&err, &cloned) {
            (
                GroupCommitError::EmitFailed { source: a, .. },
                GroupCommitError::EmitFailed { source: b, .. },
            ) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected EmitFailed"),
        }
    }

    #[test]
    fn test_illegal_state_display_names_state() {
        let err = GroupCommitError::IllegalState {
            full_key: "0000:a".into(),
            state: GroupState::Ready,
            reason: "group is emitting",
        };
        assert!(err.to_string().contains("READY"));
    }
}
