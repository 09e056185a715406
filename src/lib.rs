//! txcommit - batched commit emission for transaction coordinators
//!
//! Many transactions commit concurrently; each commit record would cost one
//! write against the underlying storage. The group committer batches them
//! so one write carries many commits, and unblocks every caller with the
//! outcome of that write.

pub mod cli;
pub mod groupcommit;
pub mod observability;
