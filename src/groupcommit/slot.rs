//! A single reservation inside a group.

use super::errors::{GroupCommitError, GroupCommitResult};

/// One reserved position in a group.
///
/// The value is written at most once; a ready slot is never modified again
/// except when its value is handed to the emitter.
#[derive(Debug)]
pub struct Slot<C, V> {
    child_key: C,
    full_key: String,
    value: Option<V>,
    ready: bool,
}

impl<C, V> Slot<C, V> {
    pub fn new(child_key: C, full_key: String) -> Self {
        Self {
            child_key,
            full_key,
            value: None,
            ready: false,
        }
    }

    pub fn child_key(&self) -> &C {
        &self.child_key
    }

    pub fn full_key(&self) -> &str {
        &self.full_key
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Store the value and mark the slot ready.
    pub fn put_value(&mut self, value: V) -> GroupCommitResult<()> {
        if self.ready {
            return Err(GroupCommitError::AlreadyReady {
                full_key: self.full_key.clone(),
            });
        }
        self.value = Some(value);
        self.ready = true;
        Ok(())
    }

    /// Hand the value over for emission.
    pub(crate) fn take_value(&mut self) -> Option<V> {
        self.value.take()
    }
}
