//! Enum dispatch over the available stores
//!
//! Zero vtable overhead: the handler is generic over [`StoreConnector`], and
//! configuration-driven construction uses [`StoreBackend`] as the connector.

use super::memory::{MemoryConnection, MemoryStore};
use super::{StoreConnection, StoreConnector};
use crate::config::{BackendKind, CacheHandlerConfig};
use crate::connection::EventSink;
use crate::error::CacheResult;
use std::time::Duration;
use tracing::warn;

#[cfg(feature = "cache-redis")]
use super::redis::{RedisConnection, RedisConnector};

/// Store selected by configuration
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// Redis-compatible server (boxed to reduce enum size)
    #[cfg(feature = "cache-redis")]
    Redis(Box<RedisConnector>),

    /// In-process store
    Memory(MemoryStore),
}

impl StoreBackend {
    /// Build the configured backend, or `None` when it cannot be used
    ///
    /// `None` means the handler should not be installed; the reason is logged.
    pub fn from_config(config: &CacheHandlerConfig) -> Option<Self> {
        match config.backend_kind() {
            Some(BackendKind::Redis) => Self::redis_from_config(config),
            Some(BackendKind::Memory) => Some(Self::Memory(MemoryStore::with_capacity(
                config.memory.max_capacity,
            ))),
            None => {
                warn!(
                    backend = %config.backend,
                    "Unknown cache backend, external cache not installed"
                );
                None
            }
        }
    }

    #[cfg(feature = "cache-redis")]
    fn redis_from_config(config: &CacheHandlerConfig) -> Option<Self> {
        let Some(redis_config) = &config.redis else {
            warn!("Redis cache selected but no store URL configured, external cache not installed");
            return None;
        };

        match RedisConnector::from_config(redis_config) {
            Ok(connector) => Some(Self::Redis(Box::new(connector))),
            Err(e) => {
                warn!(error = %e, "Redis cache misconfigured, external cache not installed");
                None
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    fn redis_from_config(_config: &CacheHandlerConfig) -> Option<Self> {
        warn!("Redis cache backend requested but 'cache-redis' feature not enabled");
        None
    }
}

impl StoreConnector for StoreBackend {
    type Connection = BackendConnection;

    async fn connect(&self, events: EventSink) -> CacheResult<BackendConnection> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.connect(events).await.map(BackendConnection::Redis),
            Self::Memory(s) => s.connect(events).await.map(BackendConnection::Memory),
        }
    }

    fn describe(&self) -> String {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.describe(),
            Self::Memory(s) => s.describe(),
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(s) => s.provider_name(),
            Self::Memory(s) => s.provider_name(),
        }
    }
}

/// Connection produced by a [`StoreBackend`]
#[derive(Debug, Clone)]
pub enum BackendConnection {
    #[cfg(feature = "cache-redis")]
    Redis(RedisConnection),
    Memory(MemoryConnection),
}

impl StoreConnection for BackendConnection {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.get(key).await,
            Self::Memory(c) => c.get(key).await,
        }
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.set_with_expiry(key, value, ttl).await,
            Self::Memory(c) => c.set_with_expiry(key, value, ttl).await,
        }
    }

    async fn add_to_sets(&self, set_keys: &[String], member: &str, ttl: Duration) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.add_to_sets(set_keys, member, ttl).await,
            Self::Memory(c) => c.add_to_sets(set_keys, member, ttl).await,
        }
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.set_members(key).await,
            Self::Memory(c) => c.set_members(key).await,
        }
    }

    async fn delete_with_index(&self, keys: &[String], index_key: &str) -> CacheResult<u64> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.delete_with_index(keys, index_key).await,
            Self::Memory(c) => c.delete_with_index(keys, index_key).await,
        }
    }

    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.exists_many(keys).await,
            Self::Memory(c) => c.exists_many(keys).await,
        }
    }

    async fn remove_from_set(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.remove_from_set(key, members).await,
            Self::Memory(c) => c.remove_from_set(key, members).await,
        }
    }

    async fn ping(&self) -> CacheResult<bool> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.ping().await,
            Self::Memory(c) => c.ping().await,
        }
    }

    async fn close(self) -> CacheResult<()> {
        match self {
            #[cfg(feature = "cache-redis")]
            Self::Redis(c) => c.close().await,
            Self::Memory(c) => c.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedisConfig;

    #[test]
    fn test_memory_backend_from_config() {
        let config = CacheHandlerConfig {
            backend: "in-memory".to_string(),
            ..CacheHandlerConfig::default()
        };
        let backend = StoreBackend::from_config(&config).unwrap();
        assert_eq!(backend.provider_name(), "memory");
    }

    #[test]
    fn test_redis_backend_without_url_is_not_installed() {
        let config = CacheHandlerConfig::default();
        assert!(StoreBackend::from_config(&config).is_none());
    }

    #[test]
    fn test_unknown_backend_is_not_installed() {
        let config = CacheHandlerConfig {
            backend: "memcached".to_string(),
            ..CacheHandlerConfig::default()
        };
        assert!(StoreBackend::from_config(&config).is_none());
    }

    #[cfg(feature = "cache-redis")]
    #[test]
    fn test_redis_backend_from_config() {
        let config = CacheHandlerConfig {
            backend: "dragonfly".to_string(),
            redis: Some(RedisConfig::new("redis://localhost:6379")),
            ..CacheHandlerConfig::default()
        };
        let backend = StoreBackend::from_config(&config).unwrap();
        assert_eq!(backend.provider_name(), "redis");
        assert_eq!(backend.describe(), "redis://localhost:6379");
    }

    #[tokio::test]
    async fn test_memory_connection_dispatch() {
        let backend = StoreBackend::Memory(MemoryStore::new());
        let (sink, _rx) = EventSink::channel(1);
        let conn = backend.connect(sink).await.unwrap();
        conn.set_with_expiry("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(conn.get("k").await.unwrap(), Some("v".to_string()));
    }
}
