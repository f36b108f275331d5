//! Connection manager behavior observed through the public handler API

mod common;

use common::{fast_config, memory_handler, unreachable_handler};
use futures::future::join_all;
use render_cache::{CacheData, CacheHandler, ConnectionState, MemoryStore, SetContext};
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_callers_share_one_connect_attempt() {
    let store = MemoryStore::new();
    store.set_connect_delay(Duration::from_millis(50));
    let cache = CacheHandler::new(store.clone(), &fast_config(3));
    let manager = cache.connection();

    let outcomes = join_all((0..10).map(|_| manager.ensure_connected())).await;

    assert_eq!(outcomes, vec![true; 10]);
    assert_eq!(store.connect_attempts(), 1);
    assert_eq!(cache.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_failed_outcome() {
    let store = MemoryStore::new();
    store.set_unreachable(true);
    store.set_connect_delay(Duration::from_millis(10));
    let cache = CacheHandler::new(store.clone(), &fast_config(3));
    let manager = cache.connection();

    let outcomes = join_all((0..10).map(|_| manager.ensure_connected())).await;

    assert_eq!(outcomes, vec![false; 10]);
    // One retry loop for everyone, not one per caller
    assert_eq!(store.connect_attempts(), 3);
    assert_eq!(cache.connection_state(), ConnectionState::Disabled);
}

#[tokio::test]
async fn test_concurrent_operations_before_first_connect() {
    let store = MemoryStore::new();
    store.set_connect_delay(Duration::from_millis(20));
    let cache = CacheHandler::new(store.clone(), &fast_config(3));

    let writes = (0..10).map(|i| {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache
                .set(
                    &format!("k{i}"),
                    CacheData::new(i),
                    SetContext::with_tags("shared"),
                )
                .await;
        })
    });
    for handle in join_all(writes).await {
        handle.unwrap();
    }

    assert_eq!(store.connect_attempts(), 1);
    assert_eq!(store.members_of("test:tag:shared").map(|m| m.len()), Some(10));
}

#[tokio::test]
async fn test_disabled_calls_return_immediately() {
    let (store, cache) = unreachable_handler(2);
    assert!(cache.get("k").await.is_none());
    assert_eq!(cache.connection_state(), ConnectionState::Disabled);

    // A slow store would make any further attempt visible in the elapsed time
    store.set_connect_delay(Duration::from_secs(5));
    let started = std::time::Instant::now();
    assert!(cache.get("k").await.is_none());
    cache
        .set("k", CacheData::new("v"), SetContext::default())
        .await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(store.connect_attempts(), 2);
}

#[tokio::test]
async fn test_reconnects_after_store_reported_disconnect() {
    let (store, cache) = memory_handler();
    cache
        .set("k", CacheData::new("v"), SetContext::default())
        .await;

    let mut states = cache.subscribe_state();
    store.drop_connections();
    states
        .wait_for(|state| *state == ConnectionState::Disconnected)
        .await
        .unwrap();

    assert_eq!(cache.get("k").await.unwrap().value, serde_json::json!("v"));
    assert_eq!(store.connect_attempts(), 2);
    assert_eq!(cache.connection_state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_dropped_connection_handle_fails() {
    let (store, cache) = memory_handler();
    cache
        .set("k", CacheData::new("v"), SetContext::default())
        .await;

    // Use the dead handle directly, before the listener has processed the drop
    let stale = cache.connection().current().unwrap();
    store.drop_connections();
    let result = render_cache::store::StoreConnection::get(&stale, "test:entry:k").await;
    assert!(matches!(
        result,
        Err(render_cache::CacheError::ConnectionError(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_linear_backoff_between_attempts() {
    let store = MemoryStore::new();
    store.set_unreachable(true);
    let mut config = fast_config(4);
    config.reconnect.backoff_step_ms = 100;
    config.reconnect.max_backoff_ms = 250;
    let cache = CacheHandler::new(store.clone(), &config);

    let started = tokio::time::Instant::now();
    assert!(!cache.connection().ensure_connected().await);

    // Sleeps after attempts 1..3: 100 + 200 + 250 (capped); none after the last
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(550), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "elapsed {elapsed:?}");
    assert_eq!(store.connect_attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_during_pending_connect_is_final() {
    let store = MemoryStore::new();
    store.set_connect_delay(Duration::from_millis(50));
    let cache = CacheHandler::new(store.clone(), &fast_config(3));

    let pending = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get("k").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.disconnect().await;

    assert!(pending.await.unwrap().is_none());
    assert_eq!(cache.connection_state(), ConnectionState::Disconnected);
    assert!(cache.connection().current().is_none());
}
