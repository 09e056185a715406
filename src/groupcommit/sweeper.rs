//! Background timeout workers
//!
//! Each policy runs on its own thread, ticking every
//! `timeout_check_interval`:
//!
//! - Size fix: an open group older than `group_size_fix_timeout` stops
//!   accepting reservations, bounding how long a batch waits for siblings.
//! - Delayed slot move: in a size-fixed group with at least one ready slot,
//!   slots still not ready `delayed_slot_move_timeout` after the size was
//!   fixed are moved into single-slot delayed groups, so one slow writer
//!   cannot stall its whole batch.
//! - Old group abort: any group older than `old_group_abort_timeout` whose
//!   emission nobody has claimed is aborted, releasing its waiters with
//!   [`GroupCommitError::Aborted`].
//!
//! Workers take the registry lock and then group locks, in the same order as
//! callers.

use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::committer::Shared;
use super::errors::{GroupCommitError, GroupCommitResult};
use super::group::{Group, GroupHandle, GroupKind};
use super::key::KeyManipulator;
use crate::observability::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SweepPolicy {
    SizeFix,
    DelayedSlotMove,
    OldGroupAbort,
}

impl SweepPolicy {
    pub(crate) const ALL: [SweepPolicy; 3] = [
        SweepPolicy::SizeFix,
        SweepPolicy::DelayedSlotMove,
        SweepPolicy::OldGroupAbort,
    ];

    pub(crate) fn name(&self) -> &'static str {
        match self {
            SweepPolicy::SizeFix => "size-fix",
            SweepPolicy::DelayedSlotMove => "delayed-slot-move",
            SweepPolicy::OldGroupAbort => "old-group-abort",
        }
    }

    fn run<K: KeyManipulator, V: Send + 'static>(&self, shared: &Shared<K, V>, now: Instant) {
        match self {
            SweepPolicy::SizeFix => shared.fix_expired_groups(now),
            SweepPolicy::DelayedSlotMove => shared.relocate_delayed_slots(now),
            SweepPolicy::OldGroupAbort => shared.abort_old_groups(now),
        }
    }
}

/// Start the worker thread for one policy. It exits once the committer
/// signals stop.
pub(crate) fn spawn<K: KeyManipulator, V: Send + 'static>(
    shared: &Arc<Shared<K, V>>,
    policy: SweepPolicy,
) -> GroupCommitResult<JoinHandle<()>> {
    let worker = format!("{}-{}", shared.label, policy.name());
    let shared = Arc::clone(shared);

    thread::Builder::new()
        .name(worker.clone())
        .spawn(move || {
            shared.log(Event::SweeperStarted, &[("sweeper", policy.name())]);
            let interval = shared.config.timeout_check_interval();
            loop {
                {
                    let stopped = shared.lock_stopped();
                    let (stopped, _) = shared
                        .stop_signal
                        .wait_timeout_while(stopped, interval, |stopped| !*stopped)
                        .unwrap_or_else(PoisonError::into_inner);
                    if *stopped {
                        break;
                    }
                }
                policy.run(&shared, Instant::now());
            }
            shared.log(Event::SweeperStopped, &[("sweeper", policy.name())]);
        })
        .map_err(|e| GroupCommitError::WorkerSpawn {
            worker,
            message: e.to_string(),
        })
}

impl<K: KeyManipulator, V: Send + 'static> Shared<K, V> {
    pub(crate) fn fix_expired_groups(&self, now: Instant) {
        let timeout = self.config.group_size_fix_timeout();
        let mut guard = self.lock_registry();
        let registry = &mut *guard;

        for handle in registry.normal.values() {
            let mut group = handle.lock();
            if group.age(now) <= timeout || !group.fix_size(now) {
                continue;
            }

            if registry
                .current
                .as_ref()
                .map_or(false, |current| Arc::ptr_eq(current, handle))
            {
                registry.current = None;
            }
            self.log(
                Event::GroupSizeFixTimeout,
                &[("parent_key", group.key()), ("slots", group.len().to_string().as_str())],
            );

            if group.try_mark_ready() {
                drop(group);
                handle.notify_all();
            }
        }
    }

    pub(crate) fn relocate_delayed_slots(&self, now: Instant) {
        let timeout = self.config.delayed_slot_move_timeout();
        let mut registry = self.lock_registry();
        let mut relocated = Vec::new();

        for handle in registry.normal.values() {
            let mut group = handle.lock();
            let lagging = group.extract_lagging_slots(now, timeout);
            if lagging.is_empty() {
                continue;
            }

            for slot in lagging {
                let full_key = slot.full_key().to_string();
                let emit_key = self.keys.emit_key_for_delayed(&full_key);
                self.metrics.increment_slots_relocated();
                self.log(
                    Event::SlotRelocated,
                    &[("from", group.key()), ("full_key", full_key.as_str())],
                );
                relocated.push((
                    full_key,
                    Arc::new(GroupHandle::new(Group::delayed(slot, emit_key, group.created_at()))),
                ));
            }

            if group.try_mark_ready() {
                drop(group);
                handle.notify_all();
            }
        }

        registry.delayed.extend(relocated);
    }

    pub(crate) fn abort_old_groups(&self, now: Instant) {
        let timeout = self.config.old_group_abort_timeout();
        let mut guard = self.lock_registry();
        let registry = &mut *guard;

        // Tombstones only need to outlive callers still holding old keys
        registry
            .tombstones
            .retain(|_, aborted_at| now.saturating_duration_since(*aborted_at) <= timeout);

        let mut aborted = Vec::new();
        for (kind, map) in [
            (GroupKind::Normal, &registry.normal),
            (GroupKind::Delayed, &registry.delayed),
        ] {
            for (key, handle) in map {
                let mut group = handle.lock();
                if group.age(now) <= timeout {
                    continue;
                }
                // Groups whose emission was claimed are left to finish
                if !group.abort(GroupCommitError::Aborted { key: key.clone() }) {
                    continue;
                }

                self.metrics.increment_groups_aborted();
                self.log(
                    Event::GroupAborted,
                    &[
                        ("key", key.as_str()),
                        ("age_ms", group.age(now).as_millis().to_string().as_str()),
                    ],
                );
                drop(group);
                handle.notify_all();
                aborted.push((kind, key.clone(), Arc::clone(handle)));
            }
        }

        for (kind, key, handle) in aborted {
            registry.unregister(kind, &key, &handle);
            registry.tombstones.insert(key, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_names() {
        let names: Vec<&str> = SweepPolicy::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["size-fix", "delayed-slot-move", "old-group-abort"]);
    }
}
