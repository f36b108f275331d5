//! In-process store
//!
//! Mirrors the Redis semantics the handler relies on (string values with
//! expiry, sets, grouped commands applied under one lock) without a server.
//! Used by the test suite and for single-instance local development; it is
//! not shared across processes.
//!
//! Failure-injection hooks (`set_unreachable`, `set_connect_delay`,
//! `drop_connections`) let tests drive the connection state machine.

use super::{ttl_seconds, StoreConnection, StoreConnector};
use crate::connection::EventSink;
use crate::constants::DEFAULT_MEMORY_MAX_CAPACITY;
use crate::error::{CacheError, CacheResult};
use moka::sync::Cache;
use moka::Expiry;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Expiring<T> {
    data: T,
    expires_at: Option<Instant>,
}

impl<T> Expiring<T> {
    fn new(data: T, ttl: Option<Duration>, now: Instant) -> Self {
        Self {
            data,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Hands each value's own deadline to moka so expired keys are reclaimed
/// even when nobody reads them again
struct RemainingTtl;

impl<T> Expiry<String, Expiring<T>> for RemainingTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Expiring<T>,
        _created_at: std::time::Instant,
    ) -> Option<Duration> {
        value
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Expiring<T>,
        _updated_at: std::time::Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// Live value under `key`; a value past its deadline is dropped on sight
fn live<T>(cache: &Cache<String, Expiring<T>>, key: &str, now: Instant) -> Option<Expiring<T>>
where
    T: Clone + Send + Sync + 'static,
{
    match cache.get(key) {
        Some(value) if value.is_live(now) => Some(value),
        Some(_) => {
            cache.invalidate(key);
            None
        }
        None => None,
    }
}

/// One logical keyspace split by value type
///
/// Entries are bounded by capacity; evicting one is just a miss, and the
/// index sets tolerate members that no longer exist. Index sets are only
/// reclaimed by expiry, so an eviction can never hide an entry from
/// revalidation.
struct Keyspace {
    strings: Cache<String, Expiring<String>>,
    sets: Cache<String, Expiring<BTreeSet<String>>>,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("max_capacity", &self.strings.policy().max_capacity())
            .field("strings", &self.strings.entry_count())
            .field("sets", &self.sets.entry_count())
            .finish()
    }
}

impl Keyspace {
    fn new(max_capacity: u64) -> Self {
        Self {
            strings: Cache::builder()
                .max_capacity(max_capacity)
                .expire_after(RemainingTtl)
                .build(),
            sets: Cache::builder().expire_after(RemainingTtl).build(),
        }
    }

    fn text(&self, key: &str, now: Instant) -> CacheResult<Option<String>> {
        if live(&self.sets, key, now).is_some() {
            return Err(wrong_type(key));
        }
        Ok(live(&self.strings, key, now).map(|v| v.data))
    }

    fn set(&self, key: &str, now: Instant) -> CacheResult<Option<Expiring<BTreeSet<String>>>> {
        if live(&self.strings, key, now).is_some() {
            return Err(wrong_type(key));
        }
        Ok(live(&self.sets, key, now))
    }

    fn exists(&self, key: &str, now: Instant) -> bool {
        live(&self.strings, key, now).is_some() || live(&self.sets, key, now).is_some()
    }

    fn insert_text(&self, key: &str, value: Expiring<String>) {
        self.sets.invalidate(key);
        self.strings.insert(key.to_string(), value);
    }

    /// Remove `key` of either type, reporting whether a live value was there
    fn remove(&self, key: &str, now: Instant) -> bool {
        let text = self.strings.remove(key).is_some_and(|v| v.is_live(now));
        let set = self.sets.remove(key).is_some_and(|v| v.is_live(now));
        text || set
    }

    fn live_len(&self, now: Instant) -> usize {
        let strings = self.strings.iter().filter(|(_, v)| v.is_live(now)).count();
        let sets = self.sets.iter().filter(|(_, v)| v.is_live(now)).count();
        strings + sets
    }

    fn stored_len(&self) -> u64 {
        self.strings.run_pending_tasks();
        self.sets.run_pending_tasks();
        self.strings.entry_count() + self.sets.entry_count()
    }
}

#[derive(Debug)]
struct MemoryInner {
    /// Held across each grouped command so it applies as a unit
    keyspace: Mutex<Keyspace>,
    unreachable: AtomicBool,
    connect_delay_ms: AtomicU64,
    connect_attempts: AtomicU64,
    /// Bumped by `drop_connections`; connections from older epochs are dead
    epoch: AtomicU64,
    sinks: Mutex<Vec<(u64, EventSink)>>,
}

/// In-process store shared by every clone
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_MAX_CAPACITY)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that keeps at most `max_capacity` cache entries
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                keyspace: Mutex::new(Keyspace::new(max_capacity)),
                unreachable: AtomicBool::new(false),
                connect_delay_ms: AtomicU64::new(0),
                connect_attempts: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                sinks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Make subsequent connect attempts fail (or succeed again)
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Delay every connect attempt, simulating a slow handshake
    pub fn set_connect_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.inner.connect_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of connect attempts observed so far
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// Kill every open connection and report the drop through their event sinks
    pub fn drop_connections(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let sinks = std::mem::take(&mut *self.inner.sinks.lock());
        for (_, sink) in sinks {
            sink.disconnected("connection reset by memory store");
        }
    }

    /// Whether a live value exists under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.keyspace.lock().exists(key, Instant::now())
    }

    /// Sorted members of the set under `key`, if it is a live set
    pub fn members_of(&self, key: &str) -> Option<Vec<String>> {
        let keyspace = self.inner.keyspace.lock();
        live(&keyspace.sets, key, Instant::now()).map(|v| v.data.into_iter().collect())
    }

    /// Remaining time to live of `key`; `None` when absent or persistent
    pub fn time_to_live(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let keyspace = self.inner.keyspace.lock();
        let expires_at = match live(&keyspace.strings, key, now) {
            Some(text) => text.expires_at,
            None => live(&keyspace.sets, key, now)?.expires_at,
        };
        expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Write a raw string value, bypassing the handler (e.g. corrupt payloads)
    pub fn insert_raw(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let value = Expiring::new(value.to_string(), ttl, Instant::now());
        self.inner.keyspace.lock().insert_text(key, value);
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.inner.keyspace.lock().live_len(Instant::now())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys physically held, after pending evictions and expirations run
    pub fn stored_len(&self) -> u64 {
        self.inner.keyspace.lock().stored_len()
    }
}

impl StoreConnector for MemoryStore {
    type Connection = MemoryConnection;

    async fn connect(&self, events: EventSink) -> CacheResult<MemoryConnection> {
        self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.inner.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(CacheError::ConnectionError(
                "memory store is unreachable".to_string(),
            ));
        }

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        self.inner.sinks.lock().push((epoch, events));

        Ok(MemoryConnection {
            inner: Arc::clone(&self.inner),
            epoch,
        })
    }

    fn describe(&self) -> String {
        "memory://local".to_string()
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// Handle onto a [`MemoryStore`]; dies when the store drops its connections
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    inner: Arc<MemoryInner>,
    epoch: u64,
}

impl MemoryConnection {
    fn keyspace(&self) -> CacheResult<parking_lot::MutexGuard<'_, Keyspace>> {
        if self.inner.epoch.load(Ordering::SeqCst) != self.epoch {
            return Err(CacheError::ConnectionError(
                "connection closed by memory store".to_string(),
            ));
        }
        Ok(self.inner.keyspace.lock())
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::OperationError(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

/// Whole-second expiry, as the server would apply it
fn expiry(ttl: Duration) -> Duration {
    Duration::from_secs(ttl_seconds(ttl))
}

impl StoreConnection for MemoryConnection {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.keyspace()?.text(key, Instant::now())
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let value = Expiring::new(value.to_string(), Some(expiry(ttl)), Instant::now());
        self.keyspace()?.insert_text(key, value);
        Ok(())
    }

    async fn add_to_sets(&self, set_keys: &[String], member: &str, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        let requested = now.checked_add(expiry(ttl));
        let keyspace = self.keyspace()?;

        // Check every key first so a type error leaves the group unapplied
        let mut current = Vec::with_capacity(set_keys.len());
        for key in set_keys {
            current.push(keyspace.set(key, now)?);
        }

        for (key, existing) in set_keys.iter().zip(current) {
            let mut value = existing.unwrap_or(Expiring {
                data: BTreeSet::new(),
                expires_at: None,
            });
            value.data.insert(member.to_string());
            // EXPIRE NX followed by EXPIRE GT: set when missing, otherwise only extend
            value.expires_at = match (value.expires_at, requested) {
                (Some(at), Some(requested)) => Some(at.max(requested)),
                (None, requested) => requested,
                (Some(at), None) => Some(at),
            };
            keyspace.sets.insert(key.clone(), value);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let set = self.keyspace()?.set(key, Instant::now())?;
        Ok(set.map(|v| v.data.into_iter().collect()).unwrap_or_default())
    }

    async fn delete_with_index(&self, keys: &[String], index_key: &str) -> CacheResult<u64> {
        let now = Instant::now();
        let keyspace = self.keyspace()?;
        let deleted = keys.iter().filter(|key| keyspace.remove(key, now)).count() as u64;
        keyspace.remove(index_key, now);
        Ok(deleted)
    }

    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>> {
        let now = Instant::now();
        let keyspace = self.keyspace()?;
        Ok(keys.iter().map(|key| keyspace.exists(key, now)).collect())
    }

    async fn remove_from_set(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        let keyspace = self.keyspace()?;
        let Some(mut value) = keyspace.set(key, Instant::now())? else {
            return Ok(0);
        };

        let removed = members
            .iter()
            .filter(|m| value.data.remove(m.as_str()))
            .count() as u64;
        if value.data.is_empty() {
            keyspace.sets.invalidate(key);
        } else if removed > 0 {
            keyspace.sets.insert(key.to_string(), value);
        }
        Ok(removed)
    }

    async fn ping(&self) -> CacheResult<bool> {
        self.keyspace().map(|_| true)
    }

    async fn close(self) -> CacheResult<()> {
        let mut sinks = self.inner.sinks.lock();
        sinks.retain(|(epoch, _)| *epoch != self.epoch);
        Ok(())
    }
}
