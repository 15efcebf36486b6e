//! Collaborator contracts consumed by the engine.
//!
//! The engine never talks to a workflow engine or credential service
//! directly. Adapters implement [`ExecutionEngine`] and [`TokenIssuer`] and
//! are injected into the orchestrator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::errors::CollaboratorError;
use crate::graph::TaskGraph;
use crate::model::WorkflowRef;
use crate::store::Selector;

/// Execution phase of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Not started yet.
    #[default]
    Pending,
    /// Running.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Not run because a dependency failed or the task was skipped.
    Skipped,
}

/// Status of one task in a submitted graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Task name.
    pub name: String,
    /// Template the task ran, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    /// Current phase.
    #[serde(default)]
    pub phase: TaskPhase,
    /// Arguments the task was started with.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    /// Output parameters the task declared.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Status of a submitted graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatus {
    /// Labels the graph was submitted with.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Per-task status.
    #[serde(default)]
    pub nodes: Vec<TaskStatus>,
}

impl GraphStatus {
    /// Returns a label value.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Returns true once every task has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.nodes.iter().all(|n| {
            matches!(
                n.phase,
                TaskPhase::Succeeded | TaskPhase::Failed | TaskPhase::Skipped
            )
        })
    }
}

/// Client of the external workflow execution engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Returns the names of every registered task template.
    async fn list_registered_templates(&self) -> Result<HashSet<String>, CollaboratorError>;

    /// Submits a graph and returns its reference.
    async fn submit_graph(&self, graph: TaskGraph) -> Result<WorkflowRef, CollaboratorError>;

    /// Returns the per-task status of a submitted graph.
    async fn graph_status(&self, workflow: &WorkflowRef) -> Result<GraphStatus, CollaboratorError>;

    /// Lists submitted graphs whose labels match `selector`.
    async fn list_graphs(&self, selector: &Selector) -> Result<Vec<WorkflowRef>, CollaboratorError>;

    /// Deletes a submitted graph.
    async fn delete_graph(&self, workflow: &WorkflowRef) -> Result<(), CollaboratorError>;
}

/// Issues the auth token handed to every task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Returns a fresh token. The value is opaque to the engine.
    async fn issue_token(&self) -> Result<String, CollaboratorError>;
}
