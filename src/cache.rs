//! Single-slot transaction cache
//!
//! Holds the last fully processed snapshot. Contents are served verbatim
//! until `invalidate` is called; there is no TTL and no partial refresh.
//! Assumes one writer at a time.

use crate::models::CacheSnapshot;
use crate::store::{get_json, put_json, KeyValueStore};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub const CACHE_KEY: &str = "transactions_cache";

#[derive(Clone)]
pub struct TransactionCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl TransactionCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, CACHE_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub async fn read(&self) -> Result<Option<CacheSnapshot>> {
        let snapshot = get_json::<CacheSnapshot>(self.store.as_ref(), &self.key).await?;
        debug!(hit = snapshot.is_some(), "Transaction cache read");
        Ok(snapshot)
    }

    pub async fn write(&self, snapshot: &CacheSnapshot) -> Result<()> {
        put_json(self.store.as_ref(), &self.key, snapshot).await?;
        info!(
            incoming = snapshot.incoming.len(),
            outgoing = snapshot.outgoing.len(),
            "Transaction cache written"
        );
        Ok(())
    }

    pub async fn invalidate(&self) -> Result<()> {
        self.store.delete(&self.key).await?;
        info!("Transaction cache invalidated");
        Ok(())
    }
}
