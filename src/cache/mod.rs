//! # Tag-Indexed Cache
//!
//! ```text
//! CacheHandler
//!   ├── KeyStore                 get/set of entry envelopes
//!   │     └── TagIndex           tag -> entry keys, updated on set
//!   └── RevalidationCoordinator  per-tag grouped delete
//! ```
//!
//! All three share one [`crate::connection::ConnectionManager`]. Their methods
//! return [`crate::error::CacheResult`]; the handler wraps every call in
//! [`fail_open`] so nothing reaches the host as an error.

pub mod entry;
pub mod fail_open;
pub mod key_store;
pub mod namespace;
pub mod revalidation;
pub mod stats;
pub mod tag_index;

pub use entry::{CacheData, CacheEntry, SetContext, TagInput};
pub use fail_open::fail_open;
pub use key_store::KeyStore;
pub use namespace::KeyNamespace;
pub use revalidation::RevalidationCoordinator;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use tag_index::TagIndex;
