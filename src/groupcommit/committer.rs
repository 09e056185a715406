//! Group Committer
//!
//! Batches concurrently arriving commits into as few emitter calls as
//! possible:
//!
//! 1. `reserve(child)` places a slot in the current open group and returns
//!    its full key
//! 2. `ready(full_key, value)` stores the value and blocks until the owning
//!    group reaches a terminal outcome
//! 3. Once every slot of a size-fixed group is ready, exactly one blocked
//!    caller runs the emitter; all callers of that group get its outcome
//!
//! Three timeout workers keep batches moving (see `sweeper`).
//!
//! # Locking
//!
//! The registry lock is always taken before a group lock, never after. The
//! emitter runs with no lock held.

use std::collections::HashMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Instant;

use super::config::GroupCommitConfig;
use super::emitter::Emittable;
use super::errors::{GroupCommitError, GroupCommitResult};
use super::group::{Group, GroupHandle, GroupKind, GroupState};
use super::key::KeyManipulator;
use super::sweeper;
use crate::observability::{log_event, Event, GroupCommitMetrics, MetricsSnapshot};

type Handle<K, V> = Arc<GroupHandle<<K as KeyManipulator>::ChildKey, V>>;

/// Live groups, indexed for lookup by `ready` and `remove`.
pub(crate) struct Registry<C, V> {
    /// The normal group accepting reservations, if any.
    pub(crate) current: Option<Arc<GroupHandle<C, V>>>,
    /// Normal groups by parent key.
    pub(crate) normal: HashMap<String, Arc<GroupHandle<C, V>>>,
    /// Delayed groups by the full key of their single slot.
    pub(crate) delayed: HashMap<String, Arc<GroupHandle<C, V>>>,
    /// Keys of aborted groups, kept for one abort window.
    pub(crate) tombstones: HashMap<String, Instant>,
    pub(crate) closed: bool,
}

impl<C, V> Registry<C, V> {
    fn new() -> Self {
        Self {
            current: None,
            normal: HashMap::new(),
            delayed: HashMap::new(),
            tombstones: HashMap::new(),
            closed: false,
        }
    }

    fn ensure_open(&self) -> GroupCommitResult<()> {
        if self.closed {
            return Err(GroupCommitError::Closed);
        }
        Ok(())
    }

    pub(crate) fn is_current(&self, handle: &Arc<GroupHandle<C, V>>) -> bool {
        self.current
            .as_ref()
            .map_or(false, |current| Arc::ptr_eq(current, handle))
    }

    /// Drop a group from the index if `handle` is still the entry for `key`.
    pub(crate) fn unregister(&mut self, kind: GroupKind, key: &str, handle: &Arc<GroupHandle<C, V>>) {
        let map = match kind {
            GroupKind::Normal => &mut self.normal,
            GroupKind::Delayed => &mut self.delayed,
        };
        if map.get(key).map_or(false, |h| Arc::ptr_eq(h, handle)) {
            map.remove(key);
        }
        if self.is_current(handle) {
            self.current = None;
        }
    }

    pub(crate) fn live_groups(&self) -> usize {
        self.normal.len() + self.delayed.len()
    }
}

/// State shared between callers and the timeout workers.
pub(crate) struct Shared<K: KeyManipulator, V> {
    pub(crate) label: String,
    pub(crate) config: GroupCommitConfig,
    pub(crate) keys: K,
    emitter: RwLock<Option<Arc<dyn Emittable<V>>>>,
    registry: Mutex<Registry<K::ChildKey, V>>,
    pub(crate) metrics: GroupCommitMetrics,
    stopped: Mutex<bool>,
    pub(crate) stop_signal: Condvar,
}

impl<K: KeyManipulator, V: Send + 'static> Shared<K, V> {
    pub(crate) fn lock_registry(&self) -> MutexGuard<'_, Registry<K::ChildKey, V>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn lock_stopped(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn log(&self, event: Event, fields: &[(&str, &str)]) {
        let mut all = Vec::with_capacity(fields.len() + 1);
        all.push(("committer", self.label.as_str()));
        all.extend_from_slice(fields);
        log_event(event, &all);
    }

    /// Find the group that owns `full_key`. Delayed groups take precedence,
    /// since a relocated slot keeps its original full key.
    fn find_group(
        &self,
        registry: &Registry<K::ChildKey, V>,
        full_key: &str,
    ) -> GroupCommitResult<Handle<K, V>> {
        if let Some(handle) = registry.delayed.get(full_key) {
            return Ok(Arc::clone(handle));
        }
        // The parent of a relocated slot can still be live after the slot's
        // delayed group was aborted
        if registry.tombstones.contains_key(full_key) {
            return Err(GroupCommitError::Aborted {
                key: full_key.to_string(),
            });
        }

        let parent_key = self
            .keys
            .parent_key_of(full_key)
            .ok_or_else(|| GroupCommitError::InvalidKey(full_key.to_string()))?;

        if let Some(handle) = registry.normal.get(&parent_key) {
            return Ok(Arc::clone(handle));
        }

        if registry.tombstones.contains_key(&parent_key) {
            return Err(GroupCommitError::Aborted { key: parent_key });
        }

        Err(GroupCommitError::UnknownKey {
            full_key: full_key.to_string(),
        })
    }

    /// Block until the group is terminal, running the emission if this
    /// caller is the one to claim it.
    fn await_outcome(&self, handle: &Handle<K, V>) -> GroupCommitResult<()> {
        let mut group = handle.lock();
        loop {
            if let Some(outcome) = group.outcome() {
                return outcome.clone();
            }

            if let Some(values) = group.claim_emission() {
                let kind = group.kind();
                let key = group.key().to_string();
                let emit_key = group.emit_key().to_string();
                drop(group);

                let outcome = self.emit(&emit_key, values);

                handle.lock().finish(outcome.clone());
                handle.notify_all();
                self.lock_registry().unregister(kind, &key, handle);
                return outcome;
            }

            group = handle.wait(group);
        }
    }

    fn emit(&self, emit_key: &str, values: Vec<V>) -> GroupCommitResult<()> {
        let emitter = self
            .emitter
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let Some(emitter) = emitter else {
            self.metrics.increment_emit_failures();
            self.log(
                Event::GroupEmitFailed,
                &[("emit_key", emit_key), ("reason", "no emitter installed")],
            );
            return Err(GroupCommitError::EmitterNotSet {
                emit_key: emit_key.to_string(),
            });
        };

        let count = values.len();
        let result = panic::catch_unwind(AssertUnwindSafe(|| emitter.execute(emit_key, values)));

        let failure = match result {
            Ok(Ok(())) => {
                self.metrics.record_emission(count);
                self.log(
                    Event::GroupEmitted,
                    &[("emit_key", emit_key), ("values", count.to_string().as_str())],
                );
                return Ok(());
            }
            Ok(Err(e)) => GroupCommitError::emit_failed(emit_key, e),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                GroupCommitError::emit_failed(emit_key, format!("emitter panicked: {}", message).into())
            }
        };

        self.metrics.increment_emit_failures();
        self.log(
            Event::GroupEmitFailed,
            &[("emit_key", emit_key), ("reason", failure.to_string().as_str())],
        );
        Err(failure)
    }
}

/// Batches commits from many threads into shared emissions.
///
/// Generic over the key manipulator `K` (which also fixes the child key
/// type) and the value type `V`.
pub struct GroupCommitter<K: KeyManipulator, V: Send + 'static> {
    shared: Arc<Shared<K, V>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<K: KeyManipulator, V: Send + 'static> GroupCommitter<K, V> {
    /// Validate `config` and start the timeout workers.
    pub fn new(label: impl Into<String>, config: GroupCommitConfig, keys: K) -> GroupCommitResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            label: label.into(),
            config,
            keys,
            emitter: RwLock::new(None),
            registry: Mutex::new(Registry::new()),
            metrics: GroupCommitMetrics::new(),
            stopped: Mutex::new(false),
            stop_signal: Condvar::new(),
        });

        let committer = Self {
            workers: Mutex::new(Vec::new()),
            shared: Arc::clone(&shared),
        };

        // Workers already running are stopped by close() when this fails
        for policy in sweeper::SweepPolicy::ALL {
            let worker = sweeper::spawn(&shared, policy)?;
            committer.lock_workers().push(worker);
        }

        shared.log(
            Event::CommitterStarted,
            &[("slot_capacity", shared.config.slot_capacity.to_string().as_str())],
        );
        Ok(committer)
    }

    /// Install (or replace) the emitter.
    pub fn set_emitter(&self, emitter: impl Emittable<V> + 'static) {
        let emitter: Arc<dyn Emittable<V>> = Arc::new(emitter);
        *self
            .shared
            .emitter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(emitter);
    }

    /// Reserve a slot in the current open group and return its full key.
    pub fn reserve(&self, child_key: K::ChildKey) -> GroupCommitResult<String> {
        let shared = &self.shared;
        let mut registry = shared.lock_registry();
        registry.ensure_open()?;

        let current = registry.current.clone();
        let handle = match current {
            Some(handle) if handle.lock().state() == GroupState::Open => handle,
            _ => {
                let parent_key = shared.keys.new_parent_key();
                let handle = Arc::new(GroupHandle::new(Group::normal(
                    parent_key.clone(),
                    shared.config.slot_capacity,
                )));
                registry.normal.insert(parent_key.clone(), Arc::clone(&handle));
                registry.current = Some(Arc::clone(&handle));
                shared.metrics.increment_groups_opened();
                shared.log(Event::GroupOpened, &[("parent_key", parent_key.as_str())]);
                handle
            }
        };

        let mut group = handle.lock();
        let full_key = shared.keys.full_key(group.key(), &child_key);
        group.reserve(child_key, full_key.clone())?;
        shared.metrics.increment_slots_reserved();

        if group.state() == GroupState::SizeFixed {
            registry.current = None;
            shared.log(
                Event::GroupSizeFixed,
                &[("parent_key", group.key()), ("slots", group.len().to_string().as_str())],
            );
        }

        Ok(full_key)
    }

    /// Supply the value for a reserved slot and block until its group has
    /// been emitted (or aborted).
    ///
    /// Every caller of one group observes the same outcome.
    pub fn ready(&self, full_key: &str, value: V) -> GroupCommitResult<()> {
        let handle = {
            let registry = self.shared.lock_registry();
            registry.ensure_open()?;
            let handle = self.shared.find_group(&registry, full_key)?;

            let mut group = handle.lock();
            group.put_value(full_key, value)?;
            group.try_mark_ready();
            drop(group);
            handle
        };

        self.shared.await_outcome(&handle)
    }

    /// Remove a slot whose group has not started emitting.
    pub fn remove(&self, full_key: &str) -> GroupCommitResult<()> {
        let shared = &self.shared;
        let mut registry = shared.lock_registry();
        registry.ensure_open()?;
        let handle = shared.find_group(&registry, full_key)?;

        let mut group = handle.lock();
        group.remove(full_key)?;
        shared.metrics.increment_slots_removed();

        if group.is_empty() {
            let kind = group.kind();
            let key = group.key().to_string();
            drop(group);
            registry.unregister(kind, &key, &handle);
            shared.metrics.increment_groups_discarded();
            shared.log(Event::GroupDiscarded, &[("key", key.as_str())]);
        } else if group.try_mark_ready() {
            drop(group);
            handle.notify_all();
        }

        Ok(())
    }

    /// Stop the workers and abandon every live group. Callers blocked in
    /// `ready` on an abandoned group receive [`GroupCommitError::Closed`].
    /// A group whose emission is already running completes normally.
    ///
    /// Idempotent.
    pub fn close(&self) {
        let shared = &self.shared;
        {
            let mut registry = shared.lock_registry();
            if registry.closed {
                return;
            }
            registry.closed = true;
            registry.current = None;

            let normal = mem::take(&mut registry.normal);
            let delayed = mem::take(&mut registry.delayed);
            registry.tombstones.clear();

            for handle in normal.values().chain(delayed.values()) {
                let mut group = handle.lock();
                if group.abort(GroupCommitError::Closed) {
                    shared.log(Event::GroupAbandoned, &[("key", group.key())]);
                    drop(group);
                    handle.notify_all();
                }
            }
        }

        *shared.lock_stopped() = true;
        shared.stop_signal.notify_all();

        for worker in mem::take(&mut *self.lock_workers()) {
            let name = worker.thread().name().unwrap_or("sweeper").to_string();
            if worker.join().is_err() {
                shared.metrics.increment_sweeper_panics();
                shared.log(Event::SweeperPanicked, &[("sweeper", name.as_str())]);
            }
        }

        shared.log(Event::CommitterClosed, &[]);
    }

    /// Lifecycle state of the group currently holding `full_key`, if any.
    pub fn group_state(&self, full_key: &str) -> Option<GroupState> {
        let registry = self.shared.lock_registry();
        let handle = self.shared.find_group(&registry, full_key).ok()?;
        let group = handle.lock();
        group.contains(full_key).then(|| group.state())
    }

    /// Number of groups that have not finished or been aborted.
    pub fn live_group_count(&self) -> usize {
        self.shared.lock_registry().live_groups()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    pub fn config(&self) -> &GroupCommitConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock_registry().closed
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: KeyManipulator, V: Send + 'static> Drop for GroupCommitter<K, V> {
    fn drop(&mut self) {
        self.close();
    }
}
