//! Tag-based bulk invalidation
//!
//! Tags are processed one at a time and independently. Each tag's members
//! and its index set go in one grouped delete; there is no atomicity across
//! tags, and a failure on one tag is logged and the next tag still runs.

use super::entry::TagInput;
use super::fail_open::fail_open;
use super::stats::CacheStats;
use super::tag_index::TagIndex;
use crate::connection::ConnectionManager;
use crate::error::CacheResult;
use crate::store::{StoreConnection, StoreConnector};
use std::sync::Arc;
use tracing::{debug, info};

pub struct RevalidationCoordinator<C: StoreConnector> {
    manager: ConnectionManager<C>,
    tag_index: TagIndex<C>,
    stats: Arc<CacheStats>,
}

impl<C: StoreConnector> Clone for RevalidationCoordinator<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            tag_index: self.tag_index.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<C: StoreConnector> std::fmt::Debug for RevalidationCoordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevalidationCoordinator")
            .field("tag_index", &self.tag_index)
            .finish()
    }
}

impl<C: StoreConnector> RevalidationCoordinator<C> {
    pub fn new(
        manager: ConnectionManager<C>,
        tag_index: TagIndex<C>,
        stats: Arc<CacheStats>,
    ) -> Self {
        Self {
            manager,
            tag_index,
            stats,
        }
    }

    /// Invalidate every entry indexed under each tag
    ///
    /// Never fails; returns the number of entries deleted across all tags.
    pub async fn revalidate(&self, tags: TagInput) -> u64 {
        let mut deleted = 0;
        for tag in tags.into_tags() {
            deleted += fail_open(
                &self.stats,
                "revalidate_tag",
                &tag,
                0,
                self.revalidate_one(&tag),
            )
            .await;
        }
        self.stats.record_revalidated(deleted);
        deleted
    }

    /// Delete one tag's members and its index set in a single grouped operation
    ///
    /// Members whose entry is already gone are deleted as no-ops, so stale
    /// index entries left behind by other tags are harmless.
    pub async fn revalidate_one(&self, tag: &str) -> CacheResult<u64> {
        let Some(connection) = self.manager.acquire().await else {
            debug!(tag = tag, "Cache store unavailable, skipping revalidation");
            return Ok(0);
        };

        let index_key = self.tag_index.index_key(tag);
        let members = connection.set_members(&index_key).await?;
        if members.is_empty() {
            debug!(tag = tag, "No entries indexed under tag");
            return Ok(0);
        }

        let deleted = connection.delete_with_index(&members, &index_key).await?;

        info!(
            tag = tag,
            members = members.len(),
            deleted = deleted,
            "Revalidated tag"
        );
        Ok(deleted)
    }
}
