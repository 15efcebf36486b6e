//! In-memory record store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use super::{Record, RecordStore, Selector};
use crate::errors::CollaboratorError;

const COLLABORATOR: &str = "store";

#[derive(Debug)]
struct StoredRecord {
    labels: BTreeMap<String, String>,
    version: u64,
    document: serde_json::Value,
}

/// A store that keeps records as serialized JSON documents.
///
/// Records are serialized on write and deserialized on read, so callers see
/// exactly what a document-oriented backend would give back.
#[derive(Debug)]
pub struct InMemoryStore<R> {
    entries: RwLock<BTreeMap<String, StoredRecord>>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            _record: PhantomData,
        }
    }
}

impl<R: Record> InMemoryStore<R> {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn encode(record: &R) -> Result<serde_json::Value, CollaboratorError> {
        serde_json::to_value(record).map_err(|e| {
            CollaboratorError::failed(COLLABORATOR, format!("cannot encode {}: {e}", R::KIND))
        })
    }

    fn decode(stored: &StoredRecord) -> Result<R, CollaboratorError> {
        let mut record: R = serde_json::from_value(stored.document.clone()).map_err(|e| {
            CollaboratorError::failed(COLLABORATOR, format!("cannot decode {}: {e}", R::KIND))
        })?;
        record.set_resource_version(stored.version);
        Ok(record)
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for InMemoryStore<R> {
    async fn get(&self, name: &str) -> Result<R, CollaboratorError> {
        let entries = self.entries.read();
        let stored = entries
            .get(name)
            .ok_or_else(|| CollaboratorError::not_found(COLLABORATOR, name))?;
        Self::decode(stored)
    }

    async fn list(&self, selector: &Selector) -> Result<Vec<R>, CollaboratorError> {
        self.entries
            .read()
            .values()
            .filter(|stored| selector.matches(&stored.labels))
            .map(Self::decode)
            .collect()
    }

    async fn create(&self, mut record: R) -> Result<R, CollaboratorError> {
        let name = record.record_name();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(CollaboratorError::conflict(
                COLLABORATOR,
                name,
                format!("{} already exists", R::KIND),
            ));
        }

        record.set_resource_version(1);
        let stored = StoredRecord {
            labels: record.labels(),
            version: 1,
            document: Self::encode(&record)?,
        };
        entries.insert(name, stored);
        Ok(record)
    }

    async fn update(&self, mut record: R) -> Result<R, CollaboratorError> {
        let name = record.record_name();
        let mut entries = self.entries.write();
        let stored = entries
            .get_mut(&name)
            .ok_or_else(|| CollaboratorError::not_found(COLLABORATOR, &name))?;

        if stored.version != record.resource_version() {
            return Err(CollaboratorError::conflict(
                COLLABORATOR,
                name,
                format!(
                    "stale {} version {} (current {})",
                    R::KIND,
                    record.resource_version(),
                    stored.version
                ),
            ));
        }

        let version = stored.version + 1;
        record.set_resource_version(version);
        stored.document = Self::encode(&record)?;
        stored.labels = record.labels();
        stored.version = version;
        Ok(record)
    }

    async fn delete(&self, name: &str) -> Result<(), CollaboratorError> {
        self.entries
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CollaboratorError::not_found(COLLABORATOR, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activity, ActivityState, InputParameters, Product, Session};
    use pretty_assertions::assert_eq;

    fn activity(name: &str) -> Activity {
        let mut activity = Activity::new(
            name,
            InputParameters::with_stages(["process-media", "deliver-product"]),
        );
        activity.products.push(Product::new("cos", "2.5.0").with_location("/media/cos"));
        activity.activity_state = ActivityState::Debug;
        activity
    }

    #[tokio::test]
    async fn test_activity_round_trip() {
        let store = InMemoryStore::<Activity>::new();
        let original = activity("a1");
        store.create(original.clone()).await.unwrap();

        let back = store.get("a1").await.unwrap();
        assert_eq!(back.input_parameters, original.input_parameters);
        assert_eq!(back.products, original.products);
        assert_eq!(back.activity_state, original.activity_state);
        assert_eq!(back.resource_version, 1);
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let store = InMemoryStore::<Activity>::new();
        store.create(activity("a1")).await.unwrap();
        let err = store.create(activity("a1")).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_stale_update_rejected() {
        let store = InMemoryStore::<Activity>::new();
        store.create(activity("a1")).await.unwrap();

        let first = store.get("a1").await.unwrap();
        let second = store.get("a1").await.unwrap();

        store.update(first).await.unwrap();
        let err = store.update(second).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_list_by_selector() {
        let store = InMemoryStore::<Session>::new();
        store.create(Session::from_activity("a1-x", &activity("a1"))).await.unwrap();
        store.create(Session::from_activity("a1-y", &activity("a1"))).await.unwrap();
        store.create(Session::from_activity("a2-x", &activity("a2"))).await.unwrap();

        let sessions = store.list(&Selector::activity("a1")).await.unwrap();
        let names: Vec<_> = sessions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a1-x", "a1-y"]);
        assert_eq!(store.list(&Selector::new()).await.unwrap().len(), 3);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let store = InMemoryStore::<Activity>::new();
        tokio_test::block_on(store.create(activity("a1"))).unwrap();
        tokio_test::block_on(store.delete("a1")).unwrap();

        assert!(store.is_empty());
        assert!(tokio_test::block_on(store.delete("a1"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = InMemoryStore::<Activity>::new();
        let err = tokio_test::block_on(store.update(activity("a1"))).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.len(), 0);
    }
}
