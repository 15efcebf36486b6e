//! Append-only activity history.

use serde::{Deserialize, Serialize};

use super::ActivityState;

/// A history entry recording an activity state change or admin action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    /// Name of the owning activity.
    pub activity_ref: String,
    /// Activity state at the time of the entry.
    pub activity_state: ActivityState,
    /// Session active at the time, if any.
    #[serde(default)]
    pub session_name: String,
    /// Millisecond epoch; identifies the entry within its activity.
    pub start_time: i64,
    /// Free-text comment. The only mutable field.
    #[serde(default)]
    pub comment: String,
    /// Store version used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
}

impl History {
    /// Creates a new entry.
    #[must_use]
    pub fn new(
        activity_ref: impl Into<String>,
        activity_state: ActivityState,
        start_time: i64,
    ) -> Self {
        Self {
            activity_ref: activity_ref.into(),
            activity_state,
            session_name: String::new(),
            start_time,
            comment: String::new(),
            resource_version: 0,
        }
    }

    /// Sets the session name.
    #[must_use]
    pub fn with_session(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Returns the store key of this entry.
    #[must_use]
    pub fn record_name(&self) -> String {
        history_name(&self.activity_ref, self.start_time)
    }
}

/// Builds the store key of a history entry.
#[must_use]
pub fn history_name(activity: &str, start_time: i64) -> String {
    format!("{activity}-{start_time}")
}
