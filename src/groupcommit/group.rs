//! Groups of slots and their lifecycle state machine.
//!
//! ```text
//! OPEN ──> SIZE_FIXED ──> READY ──> DONE
//!   │          │
//!   └──────────┴──> ABORTED
//! ```
//!
//! A normal group is opened by a reservation and named by a fresh parent
//! key. A delayed group holds exactly one slot excised from a size-fixed
//! normal group and is named by that slot's full key.
//!
//! Every group sits behind its own mutex inside a [`GroupHandle`]; callers
//! blocked on the group's outcome wait on the handle's condition variable.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::errors::{GroupCommitError, GroupCommitResult};
use super::slot::Slot;

/// Lifecycle state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// Accepting reservations.
    Open,
    /// Closed to reservations, waiting for values.
    SizeFixed,
    /// Every remaining slot is ready; emission is pending or running.
    Ready,
    /// The emitter has returned. Terminal.
    Done,
    /// Terminated without emission. Terminal.
    Aborted,
}

impl GroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupState::Open => "OPEN",
            GroupState::SizeFixed => "SIZE_FIXED",
            GroupState::Ready => "READY",
            GroupState::Done => "DONE",
            GroupState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GroupState::Done | GroupState::Aborted)
    }

    /// Whether the slot composition may still change.
    pub fn is_mutable(&self) -> bool {
        matches!(self, GroupState::Open | GroupState::SizeFixed)
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Normal,
    Delayed,
}

/// An ordered collection of slots sharing one lifecycle.
#[derive(Debug)]
pub struct Group<C, V> {
    kind: GroupKind,
    /// Parent key (normal) or rescued slot's full key (delayed).
    key: String,
    /// Identifier handed to the emitter.
    emit_key: String,
    capacity: usize,
    /// In reservation order.
    slots: Vec<Slot<C, V>>,
    state: GroupState,
    created_at: Instant,
    size_fixed_at: Option<Instant>,
    emission_claimed: bool,
    outcome: Option<GroupCommitResult<()>>,
}

impl<C: PartialEq, V> Group<C, V> {
    /// Open an empty normal group.
    pub fn normal(parent_key: String, capacity: usize) -> Self {
        Self {
            kind: GroupKind::Normal,
            emit_key: parent_key.clone(),
            key: parent_key,
            capacity,
            slots: Vec::with_capacity(capacity),
            state: GroupState::Open,
            created_at: Instant::now(),
            size_fixed_at: None,
            emission_claimed: false,
            outcome: None,
        }
    }

    /// Re-home one lagging slot. The delayed group starts size-fixed and
    /// keeps the age of the group the slot came from.
    pub fn delayed(slot: Slot<C, V>, emit_key: String, created_at: Instant) -> Self {
        Self {
            kind: GroupKind::Delayed,
            key: slot.full_key().to_string(),
            emit_key,
            capacity: 1,
            slots: vec![slot],
            state: GroupState::SizeFixed,
            created_at,
            size_fixed_at: Some(Instant::now()),
            emission_claimed: false,
            outcome: None,
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn emit_key(&self) -> &str {
        &self.emit_key
    }

    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn contains(&self, full_key: &str) -> bool {
        self.slots.iter().any(|s| s.full_key() == full_key)
    }

    #[cfg(test)]
    pub fn full_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.slots.iter().map(|s| s.full_key())
    }

    /// Append a slot. Fixes the size when capacity is reached.
    pub fn reserve(&mut self, child_key: C, full_key: String) -> GroupCommitResult<()> {
        if self.state != GroupState::Open {
            return Err(GroupCommitError::IllegalState {
                full_key,
                state: self.state,
                reason: "group is not accepting reservations",
            });
        }
        if self.slots.iter().any(|s| *s.child_key() == child_key) {
            return Err(GroupCommitError::DuplicateKey { full_key });
        }

        self.slots.push(Slot::new(child_key, full_key));
        if self.is_full() {
            self.fix_size(Instant::now());
        }
        Ok(())
    }

    /// OPEN -> SIZE_FIXED. Returns false if the group was not open.
    pub fn fix_size(&mut self, now: Instant) -> bool {
        if self.state != GroupState::Open {
            return false;
        }
        self.state = GroupState::SizeFixed;
        self.size_fixed_at = Some(now);
        true
    }

    /// Store a value for one slot.
    pub fn put_value(&mut self, full_key: &str, value: V) -> GroupCommitResult<()> {
        match self.state {
            GroupState::Aborted => {
                return Err(GroupCommitError::Aborted {
                    key: self.key.clone(),
                })
            }
            GroupState::Done => {
                return Err(GroupCommitError::UnknownKey {
                    full_key: full_key.to_string(),
                })
            }
            _ => {}
        }

        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.full_key() == full_key)
            .ok_or_else(|| GroupCommitError::UnknownKey {
                full_key: full_key.to_string(),
            })?;
        slot.put_value(value)
    }

    /// Delete a not-yet-ready slot while the composition is still mutable.
    pub fn remove(&mut self, full_key: &str) -> GroupCommitResult<()> {
        match self.state {
            GroupState::Aborted => {
                return Err(GroupCommitError::Aborted {
                    key: self.key.clone(),
                })
            }
            GroupState::Done => {
                return Err(GroupCommitError::UnknownKey {
                    full_key: full_key.to_string(),
                })
            }
            GroupState::Ready => {
                return Err(GroupCommitError::IllegalState {
                    full_key: full_key.to_string(),
                    state: self.state,
                    reason: "group is already being emitted",
                })
            }
            GroupState::Open | GroupState::SizeFixed => {}
        }

        let index = self
            .slots
            .iter()
            .position(|s| s.full_key() == full_key)
            .ok_or_else(|| GroupCommitError::UnknownKey {
                full_key: full_key.to_string(),
            })?;

        if self.slots[index].is_ready() {
            return Err(GroupCommitError::IllegalState {
                full_key: full_key.to_string(),
                state: self.state,
                reason: "slot is already ready",
            });
        }

        self.slots.remove(index);
        Ok(())
    }

    /// SIZE_FIXED -> READY when every remaining slot holds a value.
    pub fn try_mark_ready(&mut self) -> bool {
        if self.state != GroupState::SizeFixed || self.slots.is_empty() {
            return false;
        }
        if self.slots.iter().all(|s| s.is_ready()) {
            self.state = GroupState::Ready;
            return true;
        }
        false
    }

    /// Excise not-ready slots that have held back a size-fixed group for
    /// longer than `timeout`. Only applies when at least one sibling is
    /// ready; otherwise moving would not let anything complete.
    pub fn extract_lagging_slots(&mut self, now: Instant, timeout: Duration) -> Vec<Slot<C, V>> {
        if self.kind != GroupKind::Normal || self.state != GroupState::SizeFixed {
            return Vec::new();
        }
        let Some(fixed_at) = self.size_fixed_at else {
            return Vec::new();
        };
        if now.saturating_duration_since(fixed_at) <= timeout {
            return Vec::new();
        }
        if !self.slots.iter().any(|s| s.is_ready()) {
            return Vec::new();
        }

        let (ready, lagging): (Vec<_>, Vec<_>) =
            self.slots.drain(..).partition(|s| s.is_ready());
        self.slots = ready;
        lagging
    }

    /// Claim the single emission of this group, taking its values in
    /// reservation order. Returns `None` if the group is not ready or
    /// another caller already claimed it.
    pub fn claim_emission(&mut self) -> Option<Vec<V>> {
        if self.state != GroupState::Ready || self.emission_claimed {
            return None;
        }
        self.emission_claimed = true;
        Some(self.slots.iter_mut().filter_map(|s| s.take_value()).collect())
    }

    /// READY -> DONE, recording the emitter's outcome.
    pub fn finish(&mut self, outcome: GroupCommitResult<()>) {
        debug_assert_eq!(self.state, GroupState::Ready);
        self.state = GroupState::Done;
        self.outcome = Some(outcome);
    }

    /// Terminate without emission. A ready group can still be aborted until
    /// some caller claims its emission; returns whether the abort took effect.
    pub fn abort(&mut self, reason: GroupCommitError) -> bool {
        let abortable = self.state.is_mutable()
            || (self.state == GroupState::Ready && !self.emission_claimed);
        if !abortable {
            return false;
        }
        self.state = GroupState::Aborted;
        self.outcome = Some(Err(reason));
        true
    }

    /// Shared outcome, once the group reached a terminal state.
    pub fn outcome(&self) -> Option<&GroupCommitResult<()>> {
        self.outcome.as_ref()
    }
}

/// A group behind its own lock, plus the signal its waiters block on.
#[derive(Debug)]
pub struct GroupHandle<C, V> {
    group: Mutex<Group<C, V>>,
    completed: Condvar,
}

impl<C, V> GroupHandle<C, V> {
    pub fn new(group: Group<C, V>) -> Self {
        Self {
            group: Mutex::new(group),
            completed: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Group<C, V>> {
        self.group.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wait<'a>(&self, guard: MutexGuard<'a, Group<C, V>>) -> MutexGuard<'a, Group<C, V>> {
        self.completed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake every caller blocked on this group.
    pub fn notify_all(&self) {
        self.completed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full(parent: &str, child: &str) -> String {
        format!("{}:{}", parent, child)
    }

    fn group_with(capacity: usize, children: &[&str]) -> Group<String, u32> {
        let mut group = Group::normal("0000".to_string(), capacity);
        for child in children {
            group.reserve(child.to_string(), full("0000", child)).unwrap();
        }
        group
    }

    // ==================== GroupState Tests ====================

    #[test]
    fn test_state_strings() {
        assert_eq!(GroupState::Open.as_str(), "OPEN");
        assert_eq!(GroupState::SizeFixed.as_str(), "SIZE_FIXED");
        assert_eq!(GroupState::Ready.to_string(), "READY");
        assert!(GroupState::Done.is_terminal());
        assert!(GroupState::Aborted.is_terminal());
        assert!(!GroupState::Ready.is_terminal());
        assert!(GroupState::SizeFixed.is_mutable());
        assert!(!GroupState::Ready.is_mutable());
    }

    // ==================== Reservation Tests ====================

    #[test]
    fn test_reserve_until_capacity_fixes_size() {
        let mut group = group_with(2, &["a"]);
        assert_eq!(group.state(), GroupState::Open);

        group.reserve("b".into(), full("0000", "b")).unwrap();
        assert_eq!(group.state(), GroupState::SizeFixed);
        assert!(group.is_full());

        let err = group.reserve("c".into(), full("0000", "c")).unwrap_err();
        assert!(matches!(err, GroupCommitError::IllegalState { .. }));
    }

    #[test]
    fn test_duplicate_child_rejected() {
        let mut group = group_with(3, &["a"]);
        let err = group.reserve("a".into(), full("0000", "a")).unwrap_err();
        assert!(matches!(err, GroupCommitError::DuplicateKey { .. }));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_slot_order_is_reservation_order() {
        let group = group_with(3, &["c", "a", "b"]);
        let keys: Vec<&str> = group.full_keys().collect();
        assert_eq!(keys, vec!["0000:c", "0000:a", "0000:b"]);
    }

    // ==================== Readiness Tests ====================

    #[test]
    fn test_open_group_never_becomes_ready() {
        let mut group = group_with(3, &["a"]);
        group.put_value("0000:a", 1).unwrap();
        assert!(!group.try_mark_ready());
        assert_eq!(group.state(), GroupState::Open);
    }

    #[test]
    fn test_size_fixed_group_becomes_ready_and_emits_in_order() {
        let mut group = group_with(2, &["a", "b"]);
        group.put_value("0000:b", 22).unwrap();
        assert!(!group.try_mark_ready());
        group.put_value("0000:a", 11).unwrap();
        assert!(group.try_mark_ready());

        assert_eq!(group.claim_emission(), Some(vec![11, 22]));
        // Only one claim per group
        assert_eq!(group.claim_emission(), None);

        group.finish(Ok(()));
        assert_eq!(group.state(), GroupState::Done);
        assert!(matches!(group.outcome(), Some(Ok(()))));
    }

    #[test]
    fn test_put_value_unknown_slot() {
        let mut group = group_with(2, &["a"]);
        let err = group.put_value("0000:zzz", 1).unwrap_err();
        assert!(matches!(err, GroupCommitError::UnknownKey { .. }));
    }

    #[test]
    fn test_put_value_twice() {
        let mut group = group_with(2, &["a"]);
        group.put_value("0000:a", 1).unwrap();
        let err = group.put_value("0000:a", 2).unwrap_err();
        assert!(matches!(err, GroupCommitError::AlreadyReady { .. }));
    }

    // ==================== Removal Tests ====================

    #[test]
    fn test_remove_from_open_and_size_fixed() {
        let mut group = group_with(3, &["a", "b"]);
        group.remove("0000:a").unwrap();
        assert_eq!(group.len(), 1);

        group.fix_size(Instant::now());
        group.remove("0000:b").unwrap();
        assert!(group.is_empty());
        // An empty group is never ready
        assert!(!group.try_mark_ready());
    }

    #[test]
    fn test_remove_lets_remaining_ready_slots_complete() {
        let mut group = group_with(2, &["a", "b"]);
        group.put_value("0000:a", 1).unwrap();
        group.remove("0000:b").unwrap();
        assert!(group.try_mark_ready());
        assert_eq!(group.claim_emission(), Some(vec![1]));
    }

    #[test]
    fn test_remove_ready_slot_rejected() {
        let mut group = group_with(3, &["a"]);
        group.put_value("0000:a", 1).unwrap();
        let err = group.remove("0000:a").unwrap_err();
        assert!(matches!(err, GroupCommitError::IllegalState { .. }));
    }

    #[test]
    fn test_remove_after_ready_rejected() {
        let mut group = group_with(1, &["a"]);
        group.put_value("0000:a", 1).unwrap();
        assert!(group.try_mark_ready());

        let err = group.remove("0000:a").unwrap_err();
        assert!(matches!(
            err,
            GroupCommitError::IllegalState { state: GroupState::Ready, .. }
        ));
        assert_eq!(group.len(), 1);
    }

    // ==================== Delayed Slot Tests ====================

    #[test]
    fn test_extract_lagging_slots_after_timeout() {
        let mut group = group_with(3, &["a", "b", "c"]);
        group.put_value("0000:b", 2).unwrap();

        let fixed_at = group.size_fixed_at.unwrap();
        let timeout = Duration::from_millis(400);

        // Not yet
        assert!(group.extract_lagging_slots(fixed_at, timeout).is_empty());

        let later = fixed_at + Duration::from_millis(500);
        let lagging = group.extract_lagging_slots(later, timeout);
        let moved: Vec<&str> = lagging.iter().map(|s| s.full_key()).collect();
        assert_eq!(moved, vec!["0000:a", "0000:c"]);
        assert_eq!(group.len(), 1);
        assert!(group.try_mark_ready());
    }

    #[test]
    fn test_no_extraction_without_ready_sibling() {
        let mut group = group_with(2, &["a", "b"]);
        let later = Instant::now() + Duration::from_secs(5);
        assert!(group
            .extract_lagging_slots(later, Duration::from_millis(1))
            .is_empty());
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_delayed_group_is_size_fixed_single_slot() {
        let created = Instant::now();
        let slot: Slot<String, u32> = Slot::new("b".into(), "0000:b".into());
        let mut group = Group::delayed(slot, "0000:b".into(), created);

        assert_eq!(group.kind(), GroupKind::Delayed);
        assert_eq!(group.state(), GroupState::SizeFixed);
        assert_eq!(group.key(), "0000:b");
        assert_eq!(group.emit_key(), "0000:b");
        assert!(group.is_full());

        group.put_value("0000:b", 22).unwrap();
        assert!(group.try_mark_ready());
        assert_eq!(group.claim_emission(), Some(vec![22]));
    }

    // ==================== Abort Tests ====================

    #[test]
    fn test_abort_pending_group() {
        let mut group = group_with(2, &["a"]);
        assert!(group.abort(GroupCommitError::Aborted { key: "0000".into() }));
        assert_eq!(group.state(), GroupState::Aborted);
        assert!(matches!(group.outcome(), Some(Err(GroupCommitError::Aborted { .. }))));

        let err = group.put_value("0000:a", 1).unwrap_err();
        assert!(matches!(err, GroupCommitError::Aborted { .. }));
    }

    #[test]
    fn test_abort_unclaimed_ready_group() {
        let mut group = group_with(1, &["a"]);
        group.put_value("0000:a", 1).unwrap();
        group.try_mark_ready();

        assert!(group.abort(GroupCommitError::Closed));
        assert!(matches!(group.outcome(), Some(Err(GroupCommitError::Closed))));
        assert_eq!(group.claim_emission(), None);
    }

    #[test]
    fn test_abort_skips_claimed_group() {
        let mut group = group_with(1, &["a"]);
        group.put_value("0000:a", 1).unwrap();
        group.try_mark_ready();
        group.claim_emission().unwrap();

        assert!(!group.abort(GroupCommitError::Aborted { key: "0000".into() }));
        assert_eq!(group.state(), GroupState::Ready);
    }
}
