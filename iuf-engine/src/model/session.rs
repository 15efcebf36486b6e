//! Session records.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Activity, InputParameters, Product, SiteParameters};

/// The execution state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Stages are being executed.
    #[default]
    InProgress,
    /// Execution is paused.
    Paused,
    /// Execution is held for debugging.
    Debug,
    /// Every stage has run. Terminal.
    Completed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Paused => write!(f, "paused"),
            Self::Debug => write!(f, "debug"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// Opaque reference to a graph submitted to the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowRef(String);

impl WorkflowRef {
    /// Wraps an engine-issued identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One execution attempt of an activity's stage pipeline.
///
/// Parameters and products are snapshotted from the activity at creation so
/// a running session does not observe unrelated activity edits. Patches
/// re-sync parameters into non-completed sessions explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session name.
    pub name: String,
    /// Name of the owning activity.
    pub activity_ref: String,
    /// Snapshot of the activity's input parameters.
    #[serde(default)]
    pub input_parameters: InputParameters,
    /// Snapshot of the activity's site parameters.
    #[serde(default)]
    pub site_parameters: SiteParameters,
    /// Snapshot of the activity's products.
    #[serde(default)]
    pub products: Vec<Product>,
    /// Stage currently executing; empty before the first stage.
    #[serde(default)]
    pub current_stage: String,
    /// Execution state.
    #[serde(default)]
    pub current_state: SessionState,
    /// Graphs submitted so far, oldest first.
    #[serde(default)]
    pub workflows: Vec<WorkflowRef>,
    /// Store version used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
}

impl Session {
    /// Creates a session snapshot of the given activity.
    #[must_use]
    pub fn from_activity(name: impl Into<String>, activity: &Activity) -> Self {
        Self {
            name: name.into(),
            activity_ref: activity.name.clone(),
            input_parameters: activity.input_parameters.clone(),
            site_parameters: activity.site_parameters.clone(),
            products: activity.products.clone(),
            current_stage: String::new(),
            current_state: SessionState::InProgress,
            workflows: Vec::new(),
            resource_version: 0,
        }
    }

    /// Returns true if the session reached its terminal state.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.current_state == SessionState::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_snapshot() {
        let mut activity = Activity::new("a1", InputParameters::with_stages(["process-media"]));
        activity.products.push(Product::new("cos", "1.0"));

        let session = Session::from_activity("a1-s1", &activity);
        assert_eq!(session.activity_ref, "a1");
        assert_eq!(session.input_parameters.stages, vec!["process-media"]);
        assert_eq!(session.products.len(), 1);
        assert!(session.current_stage.is_empty());
        assert!(!session.is_completed());
    }

    #[test]
    fn test_workflow_ref_is_transparent() {
        let wf = WorkflowRef::new("a1-deliver-product-x7k2");
        let json = serde_json::to_string(&wf).unwrap();
        assert_eq!(json, r#""a1-deliver-product-x7k2""#);
        assert_eq!(wf.to_string(), "a1-deliver-product-x7k2");
    }

    #[test]
    fn test_session_state_serialize() {
        let json = serde_json::to_string(&SessionState::Completed).unwrap();
        assert_eq!(json, r#""completed""#);
    }
}
