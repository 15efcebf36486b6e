//! Record persistence.
//!
//! The engine never owns storage. It talks to a [`RecordStore`] per record
//! kind, which may be backed by anything that supports get/list/create/
//! update/delete with a distinguishable "not found" error. Every write is
//! guarded by the record's `resource_version`, so a stale writer receives a
//! `Conflict` instead of silently overwriting a concurrent update.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::CollaboratorError;
use crate::model::{Activity, History, Session};

/// Label naming the owning activity.
pub const LABEL_ACTIVITY: &str = "activity";

/// A record that can be persisted in a [`RecordStore`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Human-readable kind used in errors and logs.
    const KIND: &'static str;

    /// Returns the store key.
    fn record_name(&self) -> String;

    /// Returns the secondary-index labels of this record.
    fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Returns the store version this copy was read at.
    fn resource_version(&self) -> u64;

    /// Sets the store version.
    fn set_resource_version(&mut self, version: u64);
}

impl Record for Activity {
    const KIND: &'static str = "Activity";

    fn record_name(&self) -> String {
        self.name.clone()
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }
}

impl Record for Session {
    const KIND: &'static str = "Session";

    fn record_name(&self) -> String {
        self.name.clone()
    }

    fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(LABEL_ACTIVITY.to_string(), self.activity_ref.clone())])
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }
}

impl Record for History {
    const KIND: &'static str = "History";

    fn record_name(&self) -> String {
        History::record_name(self)
    }

    fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(LABEL_ACTIVITY.to_string(), self.activity_ref.clone())])
    }

    fn resource_version(&self) -> u64 {
        self.resource_version
    }

    fn set_resource_version(&mut self, version: u64) {
        self.resource_version = version;
    }
}

/// Label equality selector. An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    labels: BTreeMap<String, String>,
}

impl Selector {
    /// Creates an empty selector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects records owned by `activity`.
    #[must_use]
    pub fn activity(activity: impl Into<String>) -> Self {
        Self::new().with_label(LABEL_ACTIVITY, activity)
    }

    /// Adds a required label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Returns the required labels.
    #[must_use]
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Returns true if `labels` carries every required label.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

/// Persistence backend for one record kind.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Reads a record by name.
    async fn get(&self, name: &str) -> Result<R, CollaboratorError>;

    /// Lists records matching `selector`, ordered by name.
    async fn list(&self, selector: &Selector) -> Result<Vec<R>, CollaboratorError>;

    /// Creates a record. Fails with `Conflict` if the name is taken.
    async fn create(&self, record: R) -> Result<R, CollaboratorError>;

    /// Replaces a record. Fails with `Conflict` if `resource_version` is stale.
    async fn update(&self, record: R) -> Result<R, CollaboratorError>;

    /// Deletes a record. Fails with `NotFound` if it does not exist.
    async fn delete(&self, name: &str) -> Result<(), CollaboratorError>;
}

/// The three stores the engine needs.
#[derive(Clone)]
pub struct Stores {
    /// Activity records.
    pub activities: Arc<dyn RecordStore<Activity>>,
    /// Session records.
    pub sessions: Arc<dyn RecordStore<Session>>,
    /// History records.
    pub history: Arc<dyn RecordStore<History>>,
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

impl Stores {
    /// Creates a set of empty in-memory stores.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            activities: Arc::new(InMemoryStore::<Activity>::new()),
            sessions: Arc::new(InMemoryStore::<Session>::new()),
            history: Arc::new(InMemoryStore::<History>::new()),
        }
    }
}
