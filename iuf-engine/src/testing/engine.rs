//! In-memory collaborators.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::errors::CollaboratorError;
use crate::graph::{TaskGraph, ARG_GLOBAL_PARAMS};
use crate::ports::{ExecutionEngine, GraphStatus, TaskPhase, TaskStatus, TokenIssuer};
use crate::model::WorkflowRef;
use crate::store::Selector;

const COLLABORATOR: &str = "engine";

#[derive(Debug)]
struct SubmittedGraph {
    seq: u64,
    graph: TaskGraph,
    status: GraphStatus,
}

/// An execution engine that records submitted graphs instead of running them.
///
/// Tests drive completion explicitly with [`InMemoryExecutionEngine::complete`].
#[derive(Debug, Default)]
pub struct InMemoryExecutionEngine {
    templates: RwLock<HashSet<String>>,
    graphs: DashMap<WorkflowRef, SubmittedGraph>,
    next_id: AtomicU64,
    failing_deletes: Mutex<Vec<CollaboratorError>>,
    submit_failure: Mutex<Option<CollaboratorError>>,
}

impl InMemoryExecutionEngine {
    /// Creates an engine with no registered templates.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine with the given templates registered.
    #[must_use]
    pub fn with_templates(templates: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let engine = Self::new();
        for template in templates {
            engine.register_template(template);
        }
        engine
    }

    /// Registers a template.
    pub fn register_template(&self, name: impl Into<String>) {
        self.templates.write().insert(name.into());
    }

    /// Unregisters a template.
    pub fn unregister_template(&self, name: &str) {
        self.templates.write().remove(name);
    }

    /// Makes the next `count` deletes fail with a transient error.
    pub fn fail_next_deletes(&self, count: usize) {
        let mut failing = self.failing_deletes.lock();
        for _ in 0..count {
            failing.push(CollaboratorError::unavailable(COLLABORATOR, "injected delete failure"));
        }
    }

    /// Makes the next delete fail with `error`.
    pub fn fail_next_delete_with(&self, error: CollaboratorError) {
        self.failing_deletes.lock().push(error);
    }

    /// Makes the next submission fail with `error`.
    pub fn fail_next_submit(&self, error: CollaboratorError) {
        *self.submit_failure.lock() = Some(error);
    }

    /// Returns submitted graphs in submission order.
    #[must_use]
    pub fn submitted(&self) -> Vec<TaskGraph> {
        let mut graphs: Vec<_> = self
            .graphs
            .iter()
            .map(|entry| (entry.seq, entry.graph.clone()))
            .collect();
        graphs.sort_by_key(|(seq, _)| *seq);
        graphs.into_iter().map(|(_, graph)| graph).collect()
    }

    /// Returns the number of graphs currently held.
    #[must_use]
    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    /// Returns a submitted graph.
    #[must_use]
    pub fn graph(&self, workflow: &WorkflowRef) -> Option<TaskGraph> {
        self.graphs.get(workflow).map(|entry| entry.graph.clone())
    }

    /// Marks every task succeeded and attaches `outputs` to the named tasks.
    ///
    /// Returns the resulting status, or `None` for an unknown workflow.
    pub fn complete(
        &self,
        workflow: &WorkflowRef,
        outputs: impl IntoIterator<Item = (String, BTreeMap<String, String>)>,
    ) -> Option<GraphStatus> {
        let mut entry = self.graphs.get_mut(workflow)?;
        let mut outputs: BTreeMap<_, _> = outputs.into_iter().collect();
        for node in &mut entry.status.nodes {
            node.phase = TaskPhase::Succeeded;
            if let Some(values) = outputs.remove(&node.name) {
                node.outputs = values;
            }
        }
        Some(entry.status.clone())
    }

    /// Overrides the status of a workflow.
    pub fn set_status(&self, workflow: &WorkflowRef, status: GraphStatus) {
        if let Some(mut entry) = self.graphs.get_mut(workflow) {
            entry.status = status;
        }
    }

    fn initial_status(graph: &TaskGraph) -> GraphStatus {
        GraphStatus {
            labels: graph.labels.clone(),
            nodes: graph
                .tasks
                .iter()
                .map(|task| TaskStatus {
                    name: task.name.clone(),
                    template_name: task.template_name().map(ToString::to_string),
                    phase: TaskPhase::Pending,
                    inputs: task
                        .arguments
                        .iter()
                        .filter(|(key, _)| key.as_str() == ARG_GLOBAL_PARAMS)
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                    outputs: BTreeMap::new(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ExecutionEngine for InMemoryExecutionEngine {
    async fn list_registered_templates(&self) -> Result<HashSet<String>, CollaboratorError> {
        Ok(self.templates.read().clone())
    }

    async fn submit_graph(&self, graph: TaskGraph) -> Result<WorkflowRef, CollaboratorError> {
        if let Some(error) = self.submit_failure.lock().take() {
            return Err(error);
        }

        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        let workflow = WorkflowRef::new(format!("{}-{seq}", graph.name));
        let status = Self::initial_status(&graph);
        self.graphs
            .insert(workflow.clone(), SubmittedGraph { seq, graph, status });
        Ok(workflow)
    }

    async fn graph_status(&self, workflow: &WorkflowRef) -> Result<GraphStatus, CollaboratorError> {
        self.graphs
            .get(workflow)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| CollaboratorError::not_found(COLLABORATOR, workflow.as_str()))
    }

    async fn list_graphs(&self, selector: &Selector) -> Result<Vec<WorkflowRef>, CollaboratorError> {
        let mut matching: Vec<_> = self
            .graphs
            .iter()
            .filter(|entry| selector.matches(&entry.graph.labels))
            .map(|entry| (entry.seq, entry.key().clone()))
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        Ok(matching.into_iter().map(|(_, workflow)| workflow).collect())
    }

    async fn delete_graph(&self, workflow: &WorkflowRef) -> Result<(), CollaboratorError> {
        if let Some(error) = self.failing_deletes.lock().pop() {
            return Err(error);
        }
        self.graphs
            .remove(workflow)
            .map(|_| ())
            .ok_or_else(|| CollaboratorError::not_found(COLLABORATOR, workflow.as_str()))
    }
}

/// A token issuer that always returns the same token.
#[derive(Debug)]
pub struct StaticTokenIssuer {
    token: String,
    calls: AtomicUsize,
}

impl StaticTokenIssuer {
    /// Creates an issuer returning `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns how many tokens were issued.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for StaticTokenIssuer {
    fn default() -> Self {
        Self::new("test-token")
    }
}

#[async_trait]
impl TokenIssuer for StaticTokenIssuer {
    async fn issue_token(&self) -> Result<String, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Task, LABEL_ACTIVITY};

    fn graph(activity: &str) -> TaskGraph {
        let mut graph = TaskGraph::new("g").with_label(LABEL_ACTIVITY, activity);
        graph.tasks.push(
            Task::new("t1")
                .with_template("op", "main")
                .with_argument(ARG_GLOBAL_PARAMS, "{}")
                .with_argument("auth_token", "secret"),
        );
        graph
    }

    #[tokio::test]
    async fn test_submit_and_complete() {
        let engine = InMemoryExecutionEngine::with_templates(["op"]);
        let workflow = engine.submit_graph(graph("a1")).await.unwrap();

        let status = engine.graph_status(&workflow).await.unwrap();
        assert_eq!(status.nodes[0].phase, TaskPhase::Pending);
        assert!(!status.nodes[0].inputs.contains_key("auth_token"));

        let outputs = BTreeMap::from([("k".to_string(), "v".to_string())]);
        let status = engine
            .complete(&workflow, [("t1".to_string(), outputs)])
            .unwrap();
        assert!(status.is_finished());
        assert_eq!(status.nodes[0].outputs["k"], "v");
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let engine = InMemoryExecutionEngine::new();
        let first = engine.submit_graph(graph("a1")).await.unwrap();
        engine.submit_graph(graph("a2")).await.unwrap();

        let listed = engine.list_graphs(&Selector::activity("a1")).await.unwrap();
        assert_eq!(listed, vec![first.clone()]);

        engine.fail_next_deletes(1);
        assert!(engine.delete_graph(&first).await.unwrap_err().is_retryable());
        engine.delete_graph(&first).await.unwrap();
        assert!(engine.delete_graph(&first).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_static_token_issuer_counts() {
        let issuer = StaticTokenIssuer::default();
        assert_eq!(issuer.issue_token().await.unwrap(), "test-token");
        assert_eq!(issuer.calls(), 1);
    }
}
