//! Cascading activity deletion.
//!
//! An activity is removed together with everything that references it, in
//! a fixed order: workflow graphs, sessions, history, the activity itself.
//! Each step lists what exists and deletes it under the shared deletion
//! retry policy. "Not found" counts as deleted, so an interrupted deletion
//! can simply be run again.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::Orchestrator;
use crate::errors::{CollaboratorError, IufError};
use crate::events::event_types;
use crate::model::WorkflowRef;
use crate::ports::ExecutionEngine;
use crate::retry::with_retry;
use crate::store::{Record, RecordStore, Selector};

/// One kind of resource owned by an activity.
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    /// Resource kind, for logs.
    fn kind(&self) -> &'static str;

    /// Lists the names of the resources owned by `activity`.
    async fn list(&self, activity: &str) -> Result<Vec<String>, CollaboratorError>;

    /// Deletes one resource.
    async fn delete(&self, name: &str) -> Result<(), CollaboratorError>;
}

/// Deletes workflow graphs labeled with the activity.
pub struct WorkflowDeleter {
    engine: Arc<dyn ExecutionEngine>,
}

impl WorkflowDeleter {
    /// Creates a deleter backed by `engine`.
    #[must_use]
    pub fn new(engine: Arc<dyn ExecutionEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ResourceDeleter for WorkflowDeleter {
    fn kind(&self) -> &'static str {
        "Workflow"
    }

    async fn list(&self, activity: &str) -> Result<Vec<String>, CollaboratorError> {
        let graphs = self.engine.list_graphs(&Selector::activity(activity)).await?;
        Ok(graphs.iter().map(ToString::to_string).collect())
    }

    async fn delete(&self, name: &str) -> Result<(), CollaboratorError> {
        self.engine.delete_graph(&WorkflowRef::new(name)).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    /// Records carrying the activity label.
    Owned,
    /// The record named after the activity.
    Named,
}

/// Deletes records of one kind from a store.
pub struct RecordDeleter<R: Record> {
    store: Arc<dyn RecordStore<R>>,
    scope: Scope,
}

impl<R: Record> RecordDeleter<R> {
    /// Deletes every record labeled with the activity.
    #[must_use]
    pub fn owned(store: Arc<dyn RecordStore<R>>) -> Self {
        Self {
            store,
            scope: Scope::Owned,
        }
    }

    /// Deletes the record whose name is the activity name.
    #[must_use]
    pub fn named(store: Arc<dyn RecordStore<R>>) -> Self {
        Self {
            store,
            scope: Scope::Named,
        }
    }
}

#[async_trait]
impl<R: Record> ResourceDeleter for RecordDeleter<R> {
    fn kind(&self) -> &'static str {
        R::KIND
    }

    async fn list(&self, activity: &str) -> Result<Vec<String>, CollaboratorError> {
        match self.scope {
            Scope::Owned => {
                let records = self.store.list(&Selector::activity(activity)).await?;
                Ok(records.iter().map(Record::record_name).collect())
            }
            Scope::Named => match self.store.get(activity).await {
                Ok(record) => Ok(vec![record.record_name()]),
                Err(e) if e.is_not_found() => Ok(Vec::new()),
                Err(e) => Err(e),
            },
        }
    }

    async fn delete(&self, name: &str) -> Result<(), CollaboratorError> {
        self.store.delete(name).await
    }
}

impl Orchestrator {
    /// Deletes an activity with its workflows, sessions and history.
    ///
    /// Succeeds when the activity is already gone.
    pub async fn delete_activity(&self, name: &str) -> Result<(), IufError> {
        let retry = &self.config.deletion_retry;
        let mut deleted = 0;

        for deleter in self.deleters() {
            let kind = deleter.kind();
            let names = with_retry(retry, kind, CollaboratorError::is_retryable, || {
                deleter.list(name)
            })
            .await?;

            for item in &names {
                let key = format!("{kind}/{item}");
                match with_retry(retry, &key, CollaboratorError::is_retryable, || {
                    deleter.delete(item)
                })
                .await
                {
                    Ok(()) => deleted += 1,
                    Err(e) if e.is_not_found() => {
                        tracing::debug!(activity = name, kind, resource = %item, "Already deleted");
                    }
                    Err(e) => {
                        tracing::error!(activity = name, kind, resource = %item, error = %e, "Deletion failed");
                        return Err(e.into());
                    }
                }
            }
        }

        tracing::info!(activity = name, deleted, "Deleted activity");
        self.events
            .emit(
                event_types::ACTIVITY_DELETED,
                json!({"activity": name, "deleted": deleted}),
            )
            .await;
        Ok(())
    }

    fn deleters(&self) -> Vec<Box<dyn ResourceDeleter>> {
        vec![
            Box::new(WorkflowDeleter::new(Arc::clone(&self.engine))),
            Box::new(RecordDeleter::owned(Arc::clone(&self.stores.sessions))),
            Box::new(RecordDeleter::owned(Arc::clone(&self.stores.history))),
            Box::new(RecordDeleter::named(Arc::clone(&self.stores.activities))),
        ]
    }
}
