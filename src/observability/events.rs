//! Observable group commit events
//!
//! Events are explicit and typed; each carries its own severity.

use std::fmt;

use super::logger::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Committer constructed, workers running
    CommitterStarted,
    /// Committer shut down
    CommitterClosed,
    /// A timeout worker started
    SweeperStarted,
    /// A timeout worker stopped
    SweeperStopped,
    /// A timeout worker thread panicked; its policy no longer runs
    SweeperPanicked,

    // Group formation
    /// New normal group opened for reservations
    GroupOpened,
    /// Group closed to reservations because it reached capacity
    GroupSizeFixed,
    /// Group closed to reservations by the size-fix timeout
    GroupSizeFixTimeout,
    /// A lagging slot was moved into its own delayed group
    SlotRelocated,
    /// A group lost all of its slots and was dropped without emission
    GroupDiscarded,

    // Completion
    /// Emitter returned successfully
    GroupEmitted,
    /// Emitter failed (or was missing)
    GroupEmitFailed,
    /// Group terminated by the old-group abort timeout
    GroupAborted,
    /// Group abandoned at shutdown
    GroupAbandoned,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::CommitterStarted => "GROUP_COMMITTER_STARTED",
            Event::CommitterClosed => "GROUP_COMMITTER_CLOSED",
            Event::SweeperStarted => "SWEEPER_STARTED",
            Event::SweeperStopped => "SWEEPER_STOPPED",
            Event::SweeperPanicked => "SWEEPER_PANICKED",
            Event::GroupOpened => "GROUP_OPENED",
            Event::GroupSizeFixed => "GROUP_SIZE_FIXED",
            Event::GroupSizeFixTimeout => "GROUP_SIZE_FIX_TIMEOUT",
            Event::SlotRelocated => "SLOT_RELOCATED",
            Event::GroupDiscarded => "GROUP_DISCARDED",
            Event::GroupEmitted => "GROUP_EMITTED",
            Event::GroupEmitFailed => "GROUP_EMIT_FAILED",
            Event::GroupAborted => "GROUP_ABORTED",
            Event::GroupAbandoned => "GROUP_ABANDONED",
        }
    }

    /// Severity the event is logged at.
    pub fn severity(&self) -> Severity {
        match self {
            Event::GroupOpened
            | Event::GroupSizeFixed
            | Event::GroupSizeFixTimeout
            | Event::GroupDiscarded
            | Event::GroupEmitted => Severity::Trace,
            Event::CommitterStarted
            | Event::CommitterClosed
            | Event::SweeperStarted
            | Event::SweeperStopped => Severity::Info,
            Event::SlotRelocated | Event::GroupAborted | Event::GroupAbandoned => Severity::Warn,
            Event::GroupEmitFailed | Event::SweeperPanicked => Severity::Error,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Event; 14] = [
        Event::CommitterStarted,
        Event::CommitterClosed,
        Event::SweeperStarted,
        Event::SweeperStopped,
        Event::SweeperPanicked,
        Event::GroupOpened,
        Event::GroupSizeFixed,
        Event::GroupSizeFixTimeout,
        Event::SlotRelocated,
        Event::GroupDiscarded,
        Event::GroupEmitted,
        Event::GroupEmitFailed,
        Event::GroupAborted,
        Event::GroupAbandoned,
    ];

    #[test]
    fn test_all_events_are_upper_snake_case() {
        for event in ALL {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_failures_are_loud() {
        assert_eq!(Event::GroupEmitFailed.severity(), Severity::Error);
        assert_eq!(Event::SweeperPanicked.severity(), Severity::Error);
        assert_eq!(Event::GroupAborted.severity(), Severity::Warn);
        assert_eq!(Event::GroupEmitted.severity(), Severity::Trace);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::SlotRelocated), "SLOT_RELOCATED");
    }
}
