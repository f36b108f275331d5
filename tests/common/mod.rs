#![allow(dead_code)]

use render_cache::{CacheHandler, CacheHandlerConfig, MemoryStore, ReconnectConfig};

/// Memory-backed configuration with millisecond backoff so failure paths finish quickly
pub fn fast_config(max_attempts: u32) -> CacheHandlerConfig {
    CacheHandlerConfig {
        backend: "memory".to_string(),
        key_prefix: "test:".to_string(),
        reconnect: ReconnectConfig {
            max_attempts,
            backoff_step_ms: 1,
            max_backoff_ms: 5,
        },
        ..CacheHandlerConfig::default()
    }
}

/// Handler over a fresh in-process store, returned with the store for inspection
pub fn memory_handler() -> (MemoryStore, CacheHandler<MemoryStore>) {
    let store = MemoryStore::new();
    let handler = CacheHandler::new(store.clone(), &fast_config(3));
    (store, handler)
}

/// Handler whose store refuses every connection
pub fn unreachable_handler(max_attempts: u32) -> (MemoryStore, CacheHandler<MemoryStore>) {
    let store = MemoryStore::new();
    store.set_unreachable(true);
    let handler = CacheHandler::new(store.clone(), &fast_config(max_attempts));
    (store, handler)
}
