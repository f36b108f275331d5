//! Namespaced reads and writes of cache entry envelopes

use super::entry::{CacheData, CacheEntry, SetContext};
use super::namespace::KeyNamespace;
use super::tag_index::TagIndex;
use crate::connection::ConnectionManager;
use crate::error::CacheResult;
use crate::store::{StoreConnection, StoreConnector};
use std::time::Duration;
use tracing::debug;

pub struct KeyStore<C: StoreConnector> {
    manager: ConnectionManager<C>,
    namespace: KeyNamespace,
    tag_index: TagIndex<C>,
    default_ttl: Duration,
}

impl<C: StoreConnector> Clone for KeyStore<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            namespace: self.namespace.clone(),
            tag_index: self.tag_index.clone(),
            default_ttl: self.default_ttl,
        }
    }
}

impl<C: StoreConnector> std::fmt::Debug for KeyStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("namespace", &self.namespace)
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl<C: StoreConnector> KeyStore<C> {
    pub fn new(
        manager: ConnectionManager<C>,
        namespace: KeyNamespace,
        tag_index: TagIndex<C>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            manager,
            namespace,
            tag_index,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Read an entry
    ///
    /// `Ok(None)` when the key is absent or the store is unavailable. A
    /// payload that does not decode is a `SerializationError`.
    pub async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let Some(connection) = self.manager.acquire().await else {
            debug!(key = key, "Cache store unavailable, treating get as a miss");
            return Ok(None);
        };

        let entry_key = self.namespace.entry_key(key);
        match connection.get(&entry_key).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Write an entry and index it under its tags
    ///
    /// Returns `false` when the store was unavailable and nothing was written.
    /// The entry is written before the index update, so a failed index update
    /// leaves a live but unindexed entry that still expires on its TTL.
    pub async fn set(&self, key: &str, data: CacheData, ctx: SetContext) -> CacheResult<bool> {
        let tags = ctx.tags.into_tags();
        let ttl = data.effective_ttl(self.default_ttl);
        let payload = serde_json::to_string(&CacheEntry::new(data.value, tags.clone()))?;

        let Some(connection) = self.manager.acquire().await else {
            debug!(key = key, "Cache store unavailable, skipping set");
            return Ok(false);
        };

        let entry_key = self.namespace.entry_key(key);
        connection
            .set_with_expiry(&entry_key, &payload, ttl)
            .await?;
        self.tag_index
            .add_member(&connection, &tags, &entry_key, ttl)
            .await?;

        debug!(
            key = key,
            ttl_seconds = ttl.as_secs(),
            tags = tags.len(),
            "Cache entry stored"
        );
        Ok(true)
    }
}
