//! Group commit counters
//!
//! - Counters only, monotonic
//! - Thread-safe, lock-free (Relaxed atomics; exactness per counter, not
//!   across counters)

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters for one committer.
#[derive(Debug, Default)]
pub struct GroupCommitMetrics {
    groups_opened: AtomicU64,
    slots_reserved: AtomicU64,
    slots_removed: AtomicU64,
    slots_relocated: AtomicU64,
    groups_emitted: AtomicU64,
    values_emitted: AtomicU64,
    emit_failures: AtomicU64,
    groups_aborted: AtomicU64,
    groups_discarded: AtomicU64,
    sweeper_panics: AtomicU64,
}

impl GroupCommitMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_groups_opened(&self) {
        self.groups_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_slots_reserved(&self) {
        self.slots_reserved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_slots_removed(&self) {
        self.slots_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_slots_relocated(&self) {
        self.slots_relocated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one successful emission carrying `values` values.
    pub fn record_emission(&self, values: usize) {
        self.groups_emitted.fetch_add(1, Ordering::Relaxed);
        self.values_emitted.fetch_add(values as u64, Ordering::Relaxed);
    }

    pub fn increment_emit_failures(&self) {
        self.emit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_groups_aborted(&self) {
        self.groups_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_groups_discarded(&self) {
        self.groups_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// A timeout worker thread ended by panicking.
    pub fn increment_sweeper_panics(&self) {
        self.sweeper_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            groups_opened: self.groups_opened.load(Ordering::Relaxed),
            slots_reserved: self.slots_reserved.load(Ordering::Relaxed),
            slots_removed: self.slots_removed.load(Ordering::Relaxed),
            slots_relocated: self.slots_relocated.load(Ordering::Relaxed),
            groups_emitted: self.groups_emitted.load(Ordering::Relaxed),
            values_emitted: self.values_emitted.load(Ordering::Relaxed),
            emit_failures: self.emit_failures.load(Ordering::Relaxed),
            groups_aborted: self.groups_aborted.load(Ordering::Relaxed),
            groups_discarded: self.groups_discarded.load(Ordering::Relaxed),
            sweeper_panics: self.sweeper_panics.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub groups_opened: u64,
    pub slots_reserved: u64,
    pub slots_removed: u64,
    pub slots_relocated: u64,
    pub groups_emitted: u64,
    pub values_emitted: u64,
    pub emit_failures: u64,
    pub groups_aborted: u64,
    pub groups_discarded: u64,
    pub sweeper_panics: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        let metrics = GroupCommitMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_emission_counts_values() {
        let metrics = GroupCommitMetrics::new();
        metrics.record_emission(3);
        metrics.record_emission(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.groups_emitted, 2);
        assert_eq!(snapshot.values_emitted, 4);
    }

    #[test]
    fn test_increment_counters() {
        let metrics = GroupCommitMetrics::new();
        metrics.increment_groups_opened();
        metrics.increment_slots_reserved();
        metrics.increment_slots_reserved();
        metrics.increment_slots_removed();
        metrics.increment_slots_relocated();
        metrics.increment_emit_failures();
        metrics.increment_groups_aborted();
        metrics.increment_groups_discarded();
        metrics.increment_sweeper_panics();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.groups_opened, 1);
        assert_eq!(snapshot.slots_reserved, 2);
        assert_eq!(snapshot.slots_removed, 1);
        assert_eq!(snapshot.slots_relocated, 1);
        assert_eq!(snapshot.emit_failures, 1);
        assert_eq!(snapshot.groups_aborted, 1);
        assert_eq!(snapshot.groups_discarded, 1);
        assert_eq!(snapshot.sweeper_panics, 1);
    }

    #[test]
    fn test_to_json() {
        let metrics = GroupCommitMetrics::new();
        metrics.record_emission(2);

        let parsed: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(parsed["groups_emitted"], 1);
        assert_eq!(parsed["values_emitted"], 2);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(GroupCommitMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.increment_slots_reserved();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.snapshot().slots_reserved, 800);
    }
}
