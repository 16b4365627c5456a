//! Namespaced key-value storage collaborator.
//!
//! Durable persistence lives outside autoflow.  The core only talks to the
//! opaque [`KeyValueStore`] interface: `get`/`set`/`remove` of JSON values
//! inside a namespace.  [`MemoryStore`] is the in-process implementation used
//! by the CLI and by tests; it makes no durability promises.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::error::{StoreError, StoreResult};

/// Opaque namespaced key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `namespace/key`.
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Value>>;

    /// Store `value` under `namespace/key`, replacing any previous value.
    async fn set(&self, namespace: &str, key: &str, value: Value) -> StoreResult<()>;

    /// Delete `namespace/key`.  Returns whether a value existed.
    async fn remove(&self, namespace: &str, key: &str) -> StoreResult<bool>;

    /// List the keys present in `namespace`, in no particular order.
    async fn keys(&self, namespace: &str) -> StoreResult<Vec<String>>;
}

impl dyn KeyValueStore {
    /// Fetch and deserialize a typed record.
    pub async fn load<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> StoreResult<Option<T>> {
        match self.get(namespace, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Fetch a typed record that must exist.
    pub async fn load_required<T: DeserializeOwned>(
        &self,
        namespace: &'static str,
        key: &str,
    ) -> StoreResult<T> {
        self.load(namespace, key)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: namespace,
                id: key.to_string(),
            })
    }

    /// Serialize and store a typed record.
    pub async fn save<T: Serialize + Sync>(
        &self,
        namespace: &str,
        key: &str,
        record: &T,
    ) -> StoreResult<()> {
        let value = serde_json::to_value(record)?;
        self.set(namespace, key, value).await
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Volatile [`KeyValueStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<(String, String), Value>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all namespaces.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate(namespace: &str, key: &str) -> StoreResult<()> {
    if namespace.is_empty() {
        return Err(StoreError::InvalidArgument("namespace must not be empty".into()));
    }
    if key.is_empty() {
        return Err(StoreError::InvalidArgument("key must not be empty".into()));
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<Value>> {
        validate(namespace, key)?;
        let value = self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|entry| entry.value().clone());
        trace!(namespace, key, found = value.is_some(), "kv get");
        Ok(value)
    }

    async fn set(&self, namespace: &str, key: &str, value: Value) -> StoreResult<()> {
        validate(namespace, key)?;
        self.entries
            .insert((namespace.to_string(), key.to_string()), value);
        trace!(namespace, key, "kv set");
        Ok(())
    }

    async fn remove(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        validate(namespace, key)?;
        let removed = self
            .entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some();
        trace!(namespace, key, removed, "kv remove");
        Ok(removed)
    }

    async fn keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == namespace)
            .map(|entry| entry.key().1.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: u32,
        name: String,
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = MemoryStore::new();
        store.set("a", "k", json!(1)).await.unwrap();
        store.set("b", "k", json!(2)).await.unwrap();

        assert_eq!(store.get("a", "k").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get("b", "k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.keys("a").await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = MemoryStore::new();
        store.set("ns", "k", json!("v")).await.unwrap();
        assert!(store.remove("ns", "k").await.unwrap());
        assert!(!store.remove("ns", "k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.set("ns", "", json!(null)).await.is_err());
        assert!(store.get("", "k").await.is_err());
    }

    #[tokio::test]
    async fn typed_helpers_round_trip() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let record = Record {
            id: 7,
            name: "seven".into(),
        };
        store.save("records", "7", &record).await.unwrap();

        let loaded: Option<Record> = store.load("records", "7").await.unwrap();
        assert_eq!(loaded, Some(record));

        let missing = store.load_required::<Record>("records", "8").await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }
}
