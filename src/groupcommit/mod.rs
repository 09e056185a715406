//! Group commit engine
//!
//! Batches many concurrently arriving commits into as few downstream
//! emissions as possible, while every caller still learns the outcome of
//! the batch it was part of.
//!
//! # Guarantees
//!
//! - The emitter is called at most once per group
//! - Values reach the emitter in reservation order, not `ready` order
//! - Every caller of a group observes the same outcome
//! - A failed emission is reported once and never retried
//!
//! # Usage
//!
//! ```no_run
//! use txcommit::groupcommit::{
//!     EmitError, GroupCommitConfig, GroupCommitter, SequentialKeyManipulator,
//! };
//!
//! let committer: GroupCommitter<SequentialKeyManipulator, Vec<u8>> = GroupCommitter::new(
//!     "coordinator",
//!     GroupCommitConfig::default(),
//!     SequentialKeyManipulator::new(),
//! )?;
//! committer.set_emitter(|key: &str, values: Vec<Vec<u8>>| -> Result<(), EmitError> {
//!     println!("flushing {} values under {}", values.len(), key);
//!     Ok(())
//! });
//!
//! let full_key = committer.reserve("tx-1".to_string())?;
//! committer.ready(&full_key, b"commit record".to_vec())?;
//! # Ok::<(), txcommit::groupcommit::GroupCommitError>(())
//! ```

mod committer;
mod config;
mod emitter;
mod errors;
mod group;
mod key;
mod slot;
mod sweeper;

pub use committer::GroupCommitter;
pub use config::GroupCommitConfig;
pub use emitter::Emittable;
pub use errors::{EmitError, GroupCommitError, GroupCommitResult};
pub use group::{GroupKind, GroupState};
pub use key::{KeyManipulator, SequentialKeyManipulator};
