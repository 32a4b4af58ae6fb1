//! Agent Memory System
//!
//! Persists the last few exchanges so every new query sees recent context.
//! Single-writer: concurrent queries may overwrite each other's update.

pub mod store;

pub use store::{ConversationMemory, MemoryEntry};

use crate::store::{get_json, put_json, KeyValueStore};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

pub const MEMORY_KEY: &str = "agent_memory";
pub const MEMORY_CAPACITY: usize = 5;

/// Loads and saves the bounded history through the key-value store
pub struct MemoryStore {
    store: Arc<dyn KeyValueStore>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_capacity(store, MEMORY_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn load(&self) -> Result<ConversationMemory> {
        let entries = get_json::<Vec<MemoryEntry>>(self.store.as_ref(), MEMORY_KEY)
            .await?
            .unwrap_or_default();
        debug!(entries = entries.len(), "Agent memory loaded");
        Ok(ConversationMemory::from_entries(entries, self.capacity))
    }

    pub async fn save(&self, memory: &ConversationMemory) -> Result<()> {
        put_json(self.store.as_ref(), MEMORY_KEY, &memory.to_vec()).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.delete(MEMORY_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_round_trip_through_store() {
        tokio_test::block_on(async {
            let memory_store = MemoryStore::new(Arc::new(InMemoryStore::new()));
            assert!(memory_store.load().await.unwrap().is_empty());

            let mut memory = memory_store.load().await.unwrap();
            memory.push(MemoryEntry::new("q", "a"));
            memory_store.save(&memory).await.unwrap();

            let loaded = memory_store.load().await.unwrap();
            assert_eq!(loaded.to_vec(), vec![MemoryEntry::new("q", "a")]);

            memory_store.clear().await.unwrap();
            assert!(memory_store.load().await.unwrap().is_empty());
        });
    }

    #[test]
    fn test_persisted_format_is_plain_list() {
        tokio_test::block_on(async {
            let store = Arc::new(InMemoryStore::new());
            let memory_store = MemoryStore::new(store.clone());

            let mut memory = ConversationMemory::new(MEMORY_CAPACITY);
            memory.push(MemoryEntry::new("q", "a"));
            memory_store.save(&memory).await.unwrap();

            let raw = store.get(MEMORY_KEY).await.unwrap().unwrap();
            assert_eq!(raw, serde_json::json!([{"query": "q", "response": "a"}]));
        });
    }
}
