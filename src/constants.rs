//! # Cache Handler Constants
//!
//! Named defaults for the configuration surface. Every value here can be
//! overridden through [`crate::config::CacheHandlerConfig`].

/// Default entry TTL applied when the host does not supply a positive
/// `revalidate` value.
///
/// This is a policy choice, not a derived value: one day is a reasonable
/// upper bound for rendered fragments that are otherwise invalidated by tag.
/// Deployers override it with `default_ttl_seconds`.
pub const DEFAULT_TTL_SECONDS: u64 = 86_400;

/// Longest TTL ever written to the store (one year)
///
/// Larger `revalidate` values are clamped to this. It keeps expiry arithmetic
/// in range and every `EX` argument well inside what the store accepts.
pub const MAX_TTL_SECONDS: u64 = 365 * 86_400;

/// Entry capacity of the in-process store before it starts evicting
pub const DEFAULT_MEMORY_MAX_CAPACITY: u64 = 10_000;

/// Prefix applied to every key this handler writes
pub const DEFAULT_KEY_PREFIX: &str = "render-cache:";

/// Sub-namespace for cache entries, appended to the key prefix
pub const ENTRY_NAMESPACE: &str = "entry:";

/// Sub-namespace for tag indices, appended to the key prefix
pub const TAG_NAMESPACE: &str = "tag:";

/// Consecutive connect failures before the cache is disabled for the process
pub const DEFAULT_MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Linear backoff step between connect attempts
pub const DEFAULT_BACKOFF_STEP_MS: u64 = 50;

/// Ceiling for the linear backoff
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 500;

/// Upper bound on a single connect attempt
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2_000;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "RENDER_CACHE";

/// Conventional fallback for the store URL
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Backend identifiers accepted in configuration
pub mod backends {
    pub const REDIS: &str = "redis";
    pub const DRAGONFLY: &str = "dragonfly";
    pub const VALKEY: &str = "valkey";
    pub const MEMORY: &str = "memory";
    pub const IN_MEMORY: &str = "in-memory";
}
