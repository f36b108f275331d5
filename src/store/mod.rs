//! # Backing Store Abstraction
//!
//! The cache handler needs a small set of store primitives: keyed
//! get/set-with-expiry, set-add, set-members, expire, delete, and grouped
//! execution of several commands in one round trip.
//!
//! ```text
//! StoreBackend (enum)               <- dispatch selected by configuration
//!   ├── Redis(RedisConnector)       <- multiplexed async Redis (feature `cache-redis`)
//!   └── Memory(MemoryStore)         <- in-process store for tests and local development
//! ```
//!
//! [`StoreConnector`] establishes connections; [`StoreConnection`] is a cheap,
//! cloneable handle that many concurrent operations share.

pub mod backend;
pub mod memory;
#[cfg(feature = "cache-redis")]
pub mod redis;

use crate::connection::EventSink;
use crate::constants::MAX_TTL_SECONDS;
use crate::error::CacheResult;
use std::future::Future;
use std::time::Duration;

pub use backend::{BackendConnection, StoreBackend};
pub use memory::{MemoryConnection, MemoryStore};
#[cfg(feature = "cache-redis")]
pub use self::redis::{RedisConnection, RedisConnector};

/// Establishes connections to a backing store
pub trait StoreConnector: Send + Sync + 'static {
    type Connection: StoreConnection;

    /// Open and verify a new connection
    ///
    /// The store reports later drops or errors through `events`.
    fn connect(
        &self,
        events: EventSink,
    ) -> impl Future<Output = CacheResult<Self::Connection>> + Send;

    /// Human-readable target with credentials removed
    fn describe(&self) -> String;

    /// Get the name of the store provider
    fn provider_name(&self) -> &'static str;
}

/// Operations on an established store connection
///
/// Implementations must tolerate concurrent use of clones of the same handle.
pub trait StoreConnection: Clone + Send + Sync + 'static {
    /// Read a string value; `Ok(None)` when the key does not exist
    fn get(&self, key: &str) -> impl Future<Output = CacheResult<Option<String>>> + Send;

    /// Write a string value with an absolute expiry
    fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// In one grouped operation, add `member` to every set in `set_keys` and
    /// extend each set's expiry to at least `ttl` (never shortening it)
    fn add_to_sets(
        &self,
        set_keys: &[String],
        member: &str,
        ttl: Duration,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Members of a set; empty when the set does not exist
    fn set_members(&self, key: &str) -> impl Future<Output = CacheResult<Vec<String>>> + Send;

    /// In one grouped operation, delete `keys` and then `index_key`, returning
    /// how many of `keys` existed (the index key is not counted)
    fn delete_with_index(
        &self,
        keys: &[String],
        index_key: &str,
    ) -> impl Future<Output = CacheResult<u64>> + Send;

    /// Existence of each key, in input order
    fn exists_many(&self, keys: &[String]) -> impl Future<Output = CacheResult<Vec<bool>>> + Send;

    /// Remove members from a set, returning how many were present
    fn remove_from_set(
        &self,
        key: &str,
        members: &[String],
    ) -> impl Future<Output = CacheResult<u64>> + Send;

    /// Round-trip liveness probe
    fn ping(&self) -> impl Future<Output = CacheResult<bool>> + Send;

    /// Close the connection
    fn close(self) -> impl Future<Output = CacheResult<()>> + Send;
}

/// Expiry in whole seconds, never zero (a zero TTL would be rejected by the store)
/// and never above [`MAX_TTL_SECONDS`]
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    let secs = if ttl.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs.max(1)
    };
    secs.min(MAX_TTL_SECONDS)
}
