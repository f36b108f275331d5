//! Redis store
//!
//! Uses a single `redis::aio::MultiplexedConnection` per process: commands
//! from concurrent operations are pipelined over one socket. Reconnection is
//! driven by the connection manager, not by the client, so a dropped socket
//! is reported through the [`EventSink`] and the next operation reconnects.
//! Requires the `cache-redis` feature flag.
//!
//! Index expiry uses `EXPIRE ... NX` / `EXPIRE ... GT` and therefore needs
//! Redis 7.0 or newer (or a compatible server such as Dragonfly or Valkey).

use super::{ttl_seconds, StoreConnection, StoreConnector};
use crate::config::{redact_url, RedisConfig};
use crate::connection::EventSink;
use crate::error::{CacheError, CacheResult};
use redis::aio::MultiplexedConnection;
use redis::{Client, RedisError};
use std::time::Duration;
use tracing::debug;

/// Opens multiplexed connections to one Redis endpoint
#[derive(Clone)]
pub struct RedisConnector {
    client: Client,
    url: String,
}

impl std::fmt::Debug for RedisConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnector")
            .field("url", &redact_url(&self.url))
            .finish()
    }
}

impl RedisConnector {
    /// Create a connector from configuration
    ///
    /// Only parses the URL; no network traffic happens until the first connect.
    pub fn from_config(config: &RedisConfig) -> CacheResult<Self> {
        Self::new(&config.url)
    }

    pub fn new(url: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(|e| {
            CacheError::ConfigurationError(format!(
                "Invalid Redis URL '{}': {}",
                redact_url(url),
                e
            ))
        })?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl StoreConnector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self, events: EventSink) -> CacheResult<RedisConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Failed to connect to Redis: {e}")))?;

        let connection = RedisConnection { conn, events };
        // The handshake alone does not prove the server accepts commands (AUTH, LOADING)
        if !connection.ping().await? {
            return Err(CacheError::ConnectionError(
                "Redis did not answer PING".to_string(),
            ));
        }

        debug!(url = %redact_url(&self.url), "Redis connection established");
        Ok(connection)
    }

    fn describe(&self) -> String {
        redact_url(&self.url)
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}

/// Cloneable handle onto the shared multiplexed connection
#[derive(Clone)]
pub struct RedisConnection {
    conn: MultiplexedConnection,
    events: EventSink,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection")
            .field("generation", &self.events.generation())
            .finish()
    }
}

impl RedisConnection {
    /// Map a Redis error, reporting transport failures to the connection manager
    fn observe(&self, command: &str, e: RedisError) -> CacheError {
        if e.is_connection_dropped() || e.is_io_error() {
            self.events.disconnected(format!("Redis {command} failed: {e}"));
            CacheError::ConnectionError(format!("Redis {command} failed: {e}"))
        } else {
            self.events.error(format!("Redis {command} failed: {e}"));
            CacheError::OperationError(format!("Redis {command} failed: {e}"))
        }
    }
}

impl StoreConnection for RedisConnection {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.observe("GET", e))?;

        if result.is_some() {
            debug!(key = key, "Cache HIT");
        } else {
            debug!(key = key, "Cache MISS");
        }

        Ok(result)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let ttl_seconds = ttl_seconds(ttl);

        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.observe("SET", e))?;

        debug!(key = key, ttl_seconds = ttl_seconds, "Cache SET");
        Ok(())
    }

    async fn add_to_sets(&self, set_keys: &[String], member: &str, ttl: Duration) -> CacheResult<()> {
        if set_keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let ttl_seconds = ttl_seconds(ttl);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for key in set_keys {
            pipe.cmd("SADD").arg(key).arg(member).ignore();
            pipe.cmd("EXPIRE").arg(key).arg(ttl_seconds).arg("NX").ignore();
            pipe.cmd("EXPIRE").arg(key).arg(ttl_seconds).arg("GT").ignore();
        }

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.observe("SADD/EXPIRE pipeline", e))?;

        debug!(member = member, sets = set_keys.len(), "Tag index updated");
        Ok(())
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.observe("SMEMBERS", e))
    }

    async fn delete_with_index(&self, keys: &[String], index_key: &str) -> CacheResult<u64> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        if !keys.is_empty() {
            pipe.cmd("DEL").arg(keys);
        }
        pipe.cmd("DEL").arg(index_key).ignore();

        let counts: Vec<u64> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| self.observe("DEL (batch)", e))?;
        let deleted = counts.first().copied().unwrap_or(0);

        debug!(
            requested = keys.len(),
            deleted = deleted,
            index = index_key,
            "Cache DEL"
        );
        Ok(deleted)
    }

    async fn exists_many(&self, keys: &[String]) -> CacheResult<Vec<bool>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("EXISTS").arg(key);
        }

        pipe.query_async(&mut conn)
            .await
            .map_err(|e| self.observe("EXISTS pipeline", e))
    }

    async fn remove_from_set(&self, key: &str, members: &[String]) -> CacheResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        redis::cmd("SREM")
            .arg(key)
            .arg(members)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.observe("SREM", e))
    }

    async fn ping(&self) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.observe("PING", e))?;

        Ok(pong == "PONG")
    }

    async fn close(self) -> CacheResult<()> {
        // Dropping the last handle closes the socket; the driver task exits with it
        drop(self.conn);
        Ok(())
    }
}
