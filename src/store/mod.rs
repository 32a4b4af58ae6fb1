//! Key-value persistence layer
//!
//! Cache snapshots, the budget and the agent memory are small JSON documents
//! addressed by key. Backends are swappable without touching pipeline logic.

pub mod file;
pub mod postgres;

pub use file::FileStore;
pub use postgres::PostgresStore;

use crate::error::LedgerError;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Trait for document persistence (get/put/delete by key)
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn put(&self, key: &str, value: &Value) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Load and deserialize a document
pub async fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| LedgerError::Storage(format!("corrupt document '{}': {}", key, e))),
        None => Ok(None),
    }
}

/// Serialize and store a document
pub async fn put_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value)?;
    store.put(key, &value).await
}

/// In-memory store for development and tests
pub struct InMemoryStore {
    documents: Arc<RwLock<HashMap<String, Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let documents = self.documents.read().await;
        Ok(documents.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &Value) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut documents = self.documents.write().await;
        documents.remove(key);
        Ok(())
    }
}
