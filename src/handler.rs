//! # Host Adapter
//!
//! [`CacheHandler`] is what the rendering host installs as its external
//! cache. Every operation is fail-open: store problems become misses and
//! no-ops, logged but never returned.
//!
//! ```rust,no_run
//! use render_cache::{CacheData, CacheHandler, CacheHandlerConfig, RedisConfig, SetContext};
//!
//! # async fn example() {
//! let config = CacheHandlerConfig {
//!     redis: Some(RedisConfig::new("redis://localhost:6379")),
//!     ..CacheHandlerConfig::default()
//! };
//!
//! // `None` means the host should keep its default in-process cache
//! let Some(cache) = CacheHandler::from_config(&config) else {
//!     return;
//! };
//!
//! cache
//!     .set("page:/o/acme", CacheData::new("<rendered/>"), SetContext::with_tags("tenant:acme"))
//!     .await;
//! let hit = cache.get("page:/o/acme").await;
//! cache.revalidate_tag("tenant:acme".into()).await;
//! cache.disconnect().await;
//! # }
//! ```

use crate::cache::{
    fail_open, CacheData, CacheEntry, CacheStats, CacheStatsSnapshot, KeyNamespace, KeyStore,
    RevalidationCoordinator, SetContext, TagIndex, TagInput,
};
use crate::config::CacheHandlerConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::store::{StoreBackend, StoreConnection, StoreConnector};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// The pluggable-cache contract the rendering host calls into
///
/// None of these operations can fail from the host's point of view.
pub trait ExternalCacheHandler: Send + Sync {
    /// Cached entry for `key`, or `None` on a miss or any failure
    fn get(&self, key: &str) -> impl Future<Output = Option<CacheEntry>> + Send;

    /// Store `data` under `key`, indexed by the tags in `ctx`
    fn set(&self, key: &str, data: CacheData, ctx: SetContext) -> impl Future<Output = ()> + Send;

    /// Invalidate every entry carrying any of `tags`
    fn revalidate_tag(&self, tags: TagInput) -> impl Future<Output = ()> + Send;

    /// Drop per-request state
    fn reset_request_cache(&self) {}

    /// Close the store connection at shutdown
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}

/// External cache handler backed by a shared store
pub struct CacheHandler<C: StoreConnector = StoreBackend> {
    manager: ConnectionManager<C>,
    key_store: KeyStore<C>,
    tag_index: TagIndex<C>,
    revalidation: RevalidationCoordinator<C>,
    stats: Arc<CacheStats>,
}

impl<C: StoreConnector> Clone for CacheHandler<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            key_store: self.key_store.clone(),
            tag_index: self.tag_index.clone(),
            revalidation: self.revalidation.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<C: StoreConnector> std::fmt::Debug for CacheHandler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheHandler")
            .field("connection", &self.manager)
            .field("key_store", &self.key_store)
            .finish()
    }
}

impl CacheHandler<StoreBackend> {
    /// Build the handler the configuration asks for
    ///
    /// Returns `None` when the host should not install an external cache: the
    /// feature flag is off, the configuration is invalid, or the selected
    /// backend cannot be used. The reason is logged. No connection is made
    /// here; the first operation connects.
    pub fn from_config(config: &CacheHandlerConfig) -> Option<Self> {
        if !config.enabled {
            info!("External cache disabled by configuration, using host default cache");
            return None;
        }

        if let Err(e) = config.validate() {
            warn!(error = %e, "Invalid cache configuration, external cache not installed");
            return None;
        }

        let backend = StoreBackend::from_config(config)?;
        info!(
            provider = backend.provider_name(),
            store = %backend.describe(),
            "External cache handler installed"
        );
        Some(Self::new(backend, config))
    }
}

impl<C: StoreConnector> CacheHandler<C> {
    /// Build a handler over an explicit connector
    pub fn new(connector: C, config: &CacheHandlerConfig) -> Self {
        let manager = ConnectionManager::new(
            connector,
            config.reconnect.clone(),
            config.connect_timeout(),
        );
        let namespace = KeyNamespace::new(config.key_prefix.clone());
        let stats = Arc::new(CacheStats::new());
        let tag_index = TagIndex::new(manager.clone(), namespace.clone());
        let key_store = KeyStore::new(
            manager.clone(),
            namespace,
            tag_index.clone(),
            config.default_ttl(),
        );
        let revalidation =
            RevalidationCoordinator::new(manager.clone(), tag_index.clone(), Arc::clone(&stats));

        Self {
            manager,
            key_store,
            tag_index,
            revalidation,
            stats,
        }
    }

    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = fail_open(&self.stats, "get", key, None, self.key_store.get(key)).await;
        match entry {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        entry
    }

    pub async fn set(&self, key: &str, data: CacheData, ctx: SetContext) {
        let written = fail_open(
            &self.stats,
            "set",
            key,
            false,
            self.key_store.set(key, data, ctx),
        )
        .await;
        if written {
            self.stats.record_write();
        }
    }

    /// Invalidate every entry carrying any of `tags`, returning how many were deleted
    pub async fn revalidate_tag(&self, tags: TagInput) -> u64 {
        self.revalidation.revalidate(tags).await
    }

    /// No request-scoped state is kept, so there is nothing to reset
    pub fn reset_request_cache(&self) {}

    /// Close the connection if one is open; errors are logged and swallowed
    pub async fn disconnect(&self) {
        self.manager.shutdown().await;
    }

    /// Connect if needed and check the store answers
    pub async fn health_check(&self) -> bool {
        let store = self.manager.connector().describe();
        fail_open(&self.stats, "health_check", &store, false, async {
            match self.manager.acquire().await {
                Some(connection) => connection.ping().await,
                None => Ok(false),
            }
        })
        .await
    }

    /// Remove index members whose entries no longer exist
    ///
    /// Stale members are harmless, so this is an optional maintenance sweep
    /// for operators. Returns how many members were removed across all tags.
    pub async fn prune_tag_index(&self, tags: TagInput) -> usize {
        let mut removed = 0;
        for tag in tags.into_tags() {
            removed += fail_open(
                &self.stats,
                "prune_tag_index",
                &tag,
                0,
                self.tag_index.prune_stale(&tag),
            )
            .await;
        }
        removed
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.manager.subscribe()
    }

    /// The connection manager shared by every component of this handler
    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.manager
    }

    pub fn tag_index(&self) -> &TagIndex<C> {
        &self.tag_index
    }
}

impl<C: StoreConnector> ExternalCacheHandler for CacheHandler<C> {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        CacheHandler::get(self, key).await
    }

    async fn set(&self, key: &str, data: CacheData, ctx: SetContext) {
        CacheHandler::set(self, key, data, ctx).await
    }

    async fn revalidate_tag(&self, tags: TagInput) {
        CacheHandler::revalidate_tag(self, tags).await;
    }

    fn reset_request_cache(&self) {
        CacheHandler::reset_request_cache(self)
    }

    async fn disconnect(&self) {
        CacheHandler::disconnect(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReconnectConfig, RedisConfig};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn memory_config() -> CacheHandlerConfig {
        CacheHandlerConfig {
            backend: "memory".to_string(),
            reconnect: ReconnectConfig {
                max_attempts: 2,
                backoff_step_ms: 1,
                max_backoff_ms: 1,
            },
            ..CacheHandlerConfig::default()
        }
    }

    #[test]
    fn test_from_config_respects_feature_flag() {
        let config = CacheHandlerConfig {
            enabled: false,
            ..memory_config()
        };
        assert!(CacheHandler::from_config(&config).is_none());
    }

    #[test]
    fn test_from_config_without_store_url() {
        assert!(CacheHandler::from_config(&CacheHandlerConfig::default()).is_none());
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let config = CacheHandlerConfig {
            default_ttl_seconds: 0,
            ..memory_config()
        };
        assert!(CacheHandler::from_config(&config).is_none());
    }

    #[cfg(feature = "cache-redis")]
    #[test]
    fn test_from_config_redis_is_lazy() {
        // Nothing listens here; construction must still succeed without connecting
        let config = CacheHandlerConfig {
            redis: Some(RedisConfig::new("redis://127.0.0.1:1")),
            ..CacheHandlerConfig::default()
        };
        let handler = CacheHandler::from_config(&config).unwrap();
        assert_eq!(handler.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_memory_handler_round_trip() {
        let handler = CacheHandler::from_config(&memory_config()).unwrap();

        handler
            .set(
                "page:/o/acme",
                CacheData::new("<rendered/>"),
                SetContext::with_tags("tenant:acme"),
            )
            .await;
        let entry = handler.get("page:/o/acme").await.unwrap();
        assert_eq!(entry.value, json!("<rendered/>"));
        assert_eq!(entry.tags, vec!["tenant:acme"]);

        handler.revalidate_tag("tenant:acme".into()).await;
        assert!(handler.get("page:/o/acme").await.is_none());

        let stats = handler.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.revalidated_keys, 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = MemoryStore::new();
        let handler = CacheHandler::new(store.clone(), &memory_config());
        assert!(handler.health_check().await);

        let mut states = handler.subscribe_state();
        store.drop_connections();
        states
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await
            .unwrap();

        // Reconnects on demand
        assert!(handler.health_check().await);
        assert_eq!(store.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_health_check_unreachable_store() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        let handler = CacheHandler::new(store, &memory_config());

        assert!(!handler.health_check().await);
        assert_eq!(handler.connection_state(), ConnectionState::Disabled);
    }

    #[tokio::test]
    async fn test_trait_object_free_host_usage() {
        async fn render<H: ExternalCacheHandler>(cache: &H) -> Option<CacheEntry> {
            cache.reset_request_cache();
            cache
                .set("k", CacheData::new(json!({"n": 1})), SetContext::default())
                .await;
            cache.get("k").await
        }

        let handler = CacheHandler::new(MemoryStore::new(), &memory_config());
        let entry = render(&handler).await.unwrap();
        assert_eq!(entry.value, json!({"n": 1}));
        handler.disconnect().await;
        assert_eq!(handler.connection_state(), ConnectionState::Disconnected);
    }
}
