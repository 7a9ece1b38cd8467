//! Debug trace sink (spec §6.1 `debug`).
//!
//! Distinct from the ambient `tracing` events the planner also emits (see
//! SPEC_FULL.md §B): this sink produces a human-readable trace of planner
//! *decisions* — the kind of thing a user debugging their own policy would
//! want to read, independent of the operational log level.

use std::sync::Mutex;

/// A writable sink that receives a human-readable trace of planner
/// decisions.
pub trait DebugSink: Send + Sync {
    fn trace(&self, message: &str);
}

/// Discards every message. The default when no sink is supplied.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn trace(&self, _message: &str) {}
}

/// Forwards every message to `tracing::debug!`, for embedding the planner's
/// decision trace into a host service's existing log pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn trace(&self, message: &str) {
        tracing::debug!(target: "policy_planner::trace", "{message}");
    }
}

/// Collects messages in memory, in order, for tests and for callers that
/// want to inspect the trace after planning completes.
#[derive(Debug, Default)]
pub struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        CollectingSink::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().expect("debug sink mutex poisoned").clone()
    }
}

impl DebugSink for CollectingSink {
    fn trace(&self, message: &str) {
        self.messages
            .lock()
            .expect("debug sink mutex poisoned")
            .push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sink_discards() {
        let sink = NullSink;
        sink.trace("ignored");
    }

    #[test]
    fn collecting_sink_preserves_order() {
        let sink = CollectingSink::new();
        sink.trace("first");
        sink.trace("second");
        assert_eq!(sink.messages(), vec!["first".to_string(), "second".to_string()]);
    }
}
