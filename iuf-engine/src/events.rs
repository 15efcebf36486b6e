//! Lifecycle events.
//!
//! The orchestrator reports state changes to an injected [`EventSink`].
//! Sinks must never fail the operation that emitted the event.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Event type names emitted by the orchestrator.
pub mod event_types {
    /// A stage graph was submitted.
    pub const STAGE_SUBMITTED: &str = "session.stage_submitted";
    /// A stage had no work and was skipped.
    pub const STAGE_SKIPPED: &str = "session.stage_skipped";
    /// The current stage vanished from the stage list; progression restarted.
    pub const SESSION_RESTARTED: &str = "session.restarted";
    /// Every stage has run.
    pub const SESSION_COMPLETED: &str = "session.completed";
    /// An activity was patched.
    pub const ACTIVITY_PATCHED: &str = "activity.patched";
    /// An activity and its dependents were deleted.
    pub const ACTIVITY_DELETED: &str = "activity.deleted";
    /// A task output value was malformed and ignored.
    pub const OUTPUT_VALUE_SKIPPED: &str = "output.value_skipped";
}

/// Receiver of lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event.
    ///
    /// * `event_type` - e.g. `session.stage_submitted`
    /// * `data` - event payload
    async fn emit(&self, event_type: &str, data: serde_json::Value);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: serde_json::Value) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink logging at `level` (DEBUG or INFO).
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(event_type, event_data = %data, "Event: {event_type}");
        } else {
            info!(event_type, event_data = %data, "Event: {event_type}");
        }
    }
}

/// A sink that records events in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, serde_json::Value)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Returns the collected event types in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<(String, serde_json::Value)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        NoOpEventSink.emit(event_types::STAGE_SKIPPED, json!({})).await;
        LoggingEventSink::default()
            .emit(event_types::STAGE_SUBMITTED, json!({"stage": "x"}))
            .await;
        LoggingEventSink::debug()
            .emit(event_types::SESSION_COMPLETED, json!(null))
            .await;
    }

    #[tokio::test]
    async fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit(event_types::STAGE_SUBMITTED, json!({"stage": "a"})).await;
        sink.emit(event_types::SESSION_COMPLETED, json!({})).await;
        sink.emit(event_types::ACTIVITY_PATCHED, json!({})).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("session.").len(), 2);
        assert_eq!(sink.events()[0].1["stage"], "a");

        sink.clear();
        assert!(sink.is_empty());
    }
}
