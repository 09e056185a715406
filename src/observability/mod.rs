//! Observability for the group commit engine
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Lock-free counters
//!
//! Observability is passive: it never changes how a group progresses.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{GroupCommitMetrics, MetricsSnapshot};

/// Log an event at its own severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // Verifies no panic
        log_event(Event::CommitterStarted, &[("committer", "test")]);
        log_event(Event::GroupEmitFailed, &[("emit_key", "0000")]);
    }
}
