//! Key composition for group commit.
//!
//! A normal group is named by a parent key; each slot inside it is named by
//! the full key `<parent><separator><child>`. A delayed group is named by the
//! full key of the slot it rescued.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces and decomposes the keys a committer hands out.
///
/// Parent keys must never repeat while a group named by them is live.
pub trait KeyManipulator: Send + Sync + 'static {
    /// Caller-chosen key identifying a slot within its group.
    type ChildKey: Clone + Eq + fmt::Debug + Send + 'static;

    /// Generate a fresh, strictly increasing parent key.
    fn new_parent_key(&self) -> String;

    /// Compose a full key from its parts.
    fn full_key(&self, parent_key: &str, child_key: &Self::ChildKey) -> String;

    /// Extract the parent key from a full key.
    fn parent_key_of(&self, full_key: &str) -> Option<String>;

    /// Extract the child key from a full key.
    fn child_key_of(&self, full_key: &str) -> Option<Self::ChildKey>;

    /// Identifier passed to the emitter when a delayed group completes.
    fn emit_key_for_delayed(&self, full_key: &str) -> String {
        full_key.to_string()
    }
}

/// Counter-backed key manipulator with `String` child keys.
///
/// Parent keys are zero-padded decimal counters (`0000`, `0001`, ...). The
/// separator is split at its first occurrence, so child keys may contain it.
#[derive(Debug)]
pub struct SequentialKeyManipulator {
    counter: AtomicU64,
    width: usize,
    separator: char,
}

impl Default for SequentialKeyManipulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialKeyManipulator {
    pub const DEFAULT_WIDTH: usize = 4;
    pub const DEFAULT_SEPARATOR: char = ':';

    pub fn new() -> Self {
        Self::with_format(Self::DEFAULT_WIDTH, Self::DEFAULT_SEPARATOR)
    }

    /// Custom padding width and separator. The separator must not be an
    /// ASCII digit, since parent keys are made of digits.
    pub fn with_format(width: usize, separator: char) -> Self {
        debug_assert!(!separator.is_ascii_digit());
        Self {
            counter: AtomicU64::new(0),
            width,
            separator,
        }
    }

    fn split<'a>(&self, full_key: &'a str) -> Option<(&'a str, &'a str)> {
        let (parent, child) = full_key.split_once(self.separator)?;
        if parent.is_empty() || !parent.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some((parent, child))
    }
}

impl KeyManipulator for SequentialKeyManipulator {
    type ChildKey = String;

    fn new_parent_key(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{:0width$}", n, width = self.width)
    }

    fn full_key(&self, parent_key: &str, child_key: &String) -> String {
        format!("{}{}{}", parent_key, self.separator, child_key)
    }

    fn parent_key_of(&self, full_key: &str) -> Option<String> {
        self.split(full_key).map(|(parent, _)| parent.to_string())
    }

    fn child_key_of(&self, full_key: &str) -> Option<String> {
        self.split(full_key).map(|(_, child)| child.to_string())
    }
}
