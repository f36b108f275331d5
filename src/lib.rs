#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, Dragonfly in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Render Cache
//!
//! Fail-open, tag-indexed external cache handler for a multi-instance
//! rendering host.
//!
//! ## Overview
//!
//! Rendered fragments and data-fetch results are stored outside process
//! memory so every server instance shares one cache and can invalidate it
//! coherently. Entries carry tags; revalidating a tag deletes every entry
//! indexed under it.
//!
//! The store is an accelerator, never a dependency: when it is unreachable
//! every read is a miss and every write a no-op, with warnings in the logs
//! and no error reaching the host.
//!
//! ## Module Organization
//!
//! - [`handler`] - Host adapter ([`CacheHandler`], [`ExternalCacheHandler`])
//! - [`cache`] - Key store, tag index, revalidation, fail-open wrapper
//! - [`connection`] - Single-flight connection manager and its state machine
//! - [`store`] - Backing store seam (Redis, in-process memory)
//! - [`config`] - Configuration values and layered loading
//! - [`logging`] - Structured logging setup
//! - [`error`] - Error types
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_cache::config::ConfigManager;
//! use render_cache::{CacheData, CacheHandler, SetContext};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! render_cache::logging::init_structured_logging();
//! let config = ConfigManager::load()?;
//!
//! if let Some(cache) = CacheHandler::from_config(config.config()) {
//!     cache
//!         .set("page:/o/acme", CacheData::new("<rendered/>"), SetContext::with_tags("tenant:acme"))
//!         .await;
//!     cache.revalidate_tag("tenant:acme".into()).await;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                                # Unit and integration tests (in-memory store)
//! cargo test --features test-services       # Also run against REDIS_URL
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod handler;
pub mod logging;
pub mod store;

pub use cache::{CacheData, CacheEntry, CacheStatsSnapshot, SetContext, TagInput};
pub use config::{CacheHandlerConfig, ConfigManager, MemoryConfig, ReconnectConfig, RedisConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use constants::{DEFAULT_TTL_SECONDS, MAX_TTL_SECONDS};
pub use error::{CacheError, CacheResult};
pub use handler::{CacheHandler, ExternalCacheHandler};
pub use store::{MemoryStore, StoreBackend};
