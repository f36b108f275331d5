//! Reverse index from a tag to the entry keys carrying it
//!
//! Index sets are allowed to go stale: an entry that expires on its own stays
//! listed until the tag is revalidated or [`TagIndex::prune_stale`] runs.
//! Deleting a stale member is a harmless no-op, so readers never need the
//! index to be exact.

use super::namespace::KeyNamespace;
use crate::connection::ConnectionManager;
use crate::error::CacheResult;
use crate::store::{StoreConnection, StoreConnector};
use std::time::Duration;
use tracing::debug;

pub struct TagIndex<C: StoreConnector> {
    manager: ConnectionManager<C>,
    namespace: KeyNamespace,
}

impl<C: StoreConnector> Clone for TagIndex<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<C: StoreConnector> std::fmt::Debug for TagIndex<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagIndex")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl<C: StoreConnector> TagIndex<C> {
    pub fn new(manager: ConnectionManager<C>, namespace: KeyNamespace) -> Self {
        Self { manager, namespace }
    }

    /// Store key of a tag's index set
    pub fn index_key(&self, tag: &str) -> String {
        self.namespace.tag_key(tag)
    }

    /// Add `entry_key` to every tag's index in one grouped operation
    ///
    /// Each touched index keeps an expiry of at least `ttl`, so it never
    /// expires before the entry it now lists.
    pub async fn add_member(
        &self,
        connection: &C::Connection,
        tags: &[String],
        entry_key: &str,
        ttl: Duration,
    ) -> CacheResult<()> {
        if tags.is_empty() {
            return Ok(());
        }
        let index_keys: Vec<String> = tags.iter().map(|tag| self.index_key(tag)).collect();
        connection.add_to_sets(&index_keys, entry_key, ttl).await
    }

    /// Entry keys listed under `tag`; `None` when the store is unavailable
    pub async fn members(&self, tag: &str) -> CacheResult<Option<Vec<String>>> {
        let Some(connection) = self.manager.acquire().await else {
            return Ok(None);
        };
        connection.set_members(&self.index_key(tag)).await.map(Some)
    }

    /// Remove members whose entry no longer exists, returning how many went
    pub async fn prune_stale(&self, tag: &str) -> CacheResult<usize> {
        let Some(connection) = self.manager.acquire().await else {
            return Ok(0);
        };

        let index_key = self.index_key(tag);
        let members = connection.set_members(&index_key).await?;
        if members.is_empty() {
            return Ok(0);
        }

        let live = connection.exists_many(&members).await?;
        let stale: Vec<String> = members
            .into_iter()
            .zip(live)
            .filter_map(|(member, exists)| (!exists).then_some(member))
            .collect();

        let removed = connection.remove_from_set(&index_key, &stale).await?;
        debug!(tag = tag, removed = removed, "Pruned stale tag index members");
        Ok(removed as usize)
    }
}
