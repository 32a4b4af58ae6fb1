//! Session-scoped state
//!
//! Replaces process-wide globals: the linked access token and the session's
//! transaction cache travel together and are passed explicitly to the
//! pipeline and the agent tool.

use crate::cache::TransactionCache;
use crate::store::{get_json, put_json, KeyValueStore};
use crate::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Key under which the linked account's access token is kept
pub const ACCESS_TOKEN_KEY: &str = "access_token";

pub struct Session {
    store: Arc<dyn KeyValueStore>,
    access_token: RwLock<Option<String>>,
    cache: TransactionCache,
}

impl Session {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            access_token: RwLock::new(None),
            cache: TransactionCache::new(store.clone()),
            store,
        }
    }

    /// Pick up the account linked by an earlier process, if any
    pub async fn restore(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let token = get_json::<String>(store.as_ref(), ACCESS_TOKEN_KEY)
            .await?
            .filter(|t| !t.trim().is_empty());
        info!(linked = token.is_some(), "Session restored");

        Ok(Self {
            access_token: RwLock::new(token),
            cache: TransactionCache::new(store.clone()),
            store,
        })
    }

    /// Resume a session whose account was linked earlier.
    ///
    /// The cache is left as is; only a new link invalidates it.
    pub fn with_access_token(store: Arc<dyn KeyValueStore>, access_token: impl Into<String>) -> Self {
        Self {
            access_token: RwLock::new(Some(access_token.into())),
            cache: TransactionCache::new(store.clone()),
            store,
        }
    }

    pub async fn access_token(&self) -> Option<String> {
        self.access_token.read().await.clone()
    }

    pub fn cache(&self) -> &TransactionCache {
        &self.cache
    }

    /// Link a (new) bank account. Always drops the cached snapshot.
    ///
    /// The token is persisted so later sessions over the same store can
    /// `restore` it.
    pub async fn link_account(&self, access_token: impl Into<String>) -> Result<()> {
        let access_token = access_token.into();
        put_json(self.store.as_ref(), ACCESS_TOKEN_KEY, &access_token).await?;
        {
            let mut token = self.access_token.write().await;
            *token = Some(access_token);
        }
        self.cache.invalidate().await?;
        info!("Account linked, transaction cache cleared");
        Ok(())
    }

    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.invalidate().await
    }
}
