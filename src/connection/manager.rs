//! Connection manager: one lazily-established store connection per handler
//!
//! Concurrent callers never trigger duplicate connection attempts. The first
//! caller installs a shared in-flight attempt; everyone else awaits that same
//! outcome. An attempt runs the bounded retry loop to completion, so a caller
//! waits for at most `max_attempts` connects plus the linear backoff between
//! them. Exhausting the loop moves the manager to `Disabled` for good.

use super::events::{ConnectionEvent, ConnectionEventKind, EventSink};
use super::state::ConnectionState;
use crate::config::ReconnectConfig;
use crate::error::CacheError;
use crate::logging::log_state_transition;
use crate::store::{StoreConnection, StoreConnector};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "cache_connection";

type ConnectAttempt = Shared<BoxFuture<'static, bool>>;

/// The live connection plus the listener watching its events
struct ActiveConnection<T> {
    generation: u64,
    connection: T,
    listener: JoinHandle<()>,
}

struct ManagerInner<C: StoreConnector> {
    connector: C,
    policy: ReconnectConfig,
    connect_timeout: Duration,
    state: watch::Sender<ConnectionState>,
    active: RwLock<Option<ActiveConnection<C::Connection>>>,
    in_flight: Mutex<Option<ConnectAttempt>>,
    /// Bumped by `shutdown`; attempts started before the bump are cancelled
    shutdowns: AtomicU64,
    generation: AtomicU64,
    connect_attempts: AtomicU64,
}

/// Owns the single store connection shared by every cache operation
///
/// Cheap to clone; clones share state. Construct one per handler and pass it
/// to the components that need the store.
pub struct ConnectionManager<C: StoreConnector> {
    inner: Arc<ManagerInner<C>>,
}

impl<C: StoreConnector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: StoreConnector> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("store", &self.inner.connector.describe())
            .field("state", &self.state())
            .field("connect_attempts", &self.connect_attempts())
            .finish()
    }
}

impl<C: StoreConnector> ConnectionManager<C> {
    /// Create a manager; no connection is made until the first operation
    pub fn new(connector: C, policy: ReconnectConfig, connect_timeout: Duration) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ManagerInner {
                connector,
                policy,
                connect_timeout,
                state,
                active: RwLock::new(None),
                in_flight: Mutex::new(None),
                shutdowns: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                connect_attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Underlying connect attempts made so far
    pub fn connect_attempts(&self) -> u64 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn connector(&self) -> &C {
        &self.inner.connector
    }

    /// Make sure a connection is ready, connecting if needed
    ///
    /// Returns `false` when the store is unavailable; never errors. Once the
    /// manager is `Disabled` this returns immediately without connecting.
    pub async fn ensure_connected(&self) -> bool {
        if let Some(ready) = self.inner.settled() {
            return ready;
        }

        let attempt = {
            let mut in_flight = self.inner.in_flight.lock();
            // Re-check under the lock: an attempt may have finished meanwhile
            if let Some(ready) = self.inner.settled() {
                return ready;
            }
            match in_flight.as_ref() {
                Some(attempt) => attempt.clone(),
                None => {
                    let shutdowns = self.inner.shutdowns.load(Ordering::SeqCst);
                    let attempt = Arc::clone(&self.inner)
                        .connect_with_retry(shutdowns)
                        .boxed()
                        .shared();
                    *in_flight = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Ready connection handle, connecting first if needed
    pub async fn acquire(&self) -> Option<C::Connection> {
        if !self.ensure_connected().await {
            return None;
        }
        self.current()
    }

    /// Connection handle if one is live right now, without connecting
    pub fn current(&self) -> Option<C::Connection> {
        self.inner
            .active
            .read()
            .as_ref()
            .map(|active| active.connection.clone())
    }

    /// Close the connection if one is open; errors are logged, not returned
    ///
    /// An attempt still in flight is cancelled: it never installs its
    /// connection, and its waiters see the store as unavailable.
    pub async fn shutdown(&self) {
        {
            let mut in_flight = self.inner.in_flight.lock();
            self.inner.shutdowns.fetch_add(1, Ordering::SeqCst);
            *in_flight = None;
        }
        let active = self.inner.active.write().take();
        if let Some(active) = active {
            active.listener.abort();
            if let Err(e) = active.connection.close().await {
                warn!(error = %e, "Error while closing cache store connection");
            }
            info!(store = %self.inner.connector.describe(), "Cache store connection closed");
        }
        self.inner
            .transition(ConnectionState::Disconnected, Some("shutdown"));
    }
}

impl<C: StoreConnector> ManagerInner<C> {
    /// `Some(outcome)` when no attempt is needed
    fn settled(&self) -> Option<bool> {
        let state = *self.state.borrow();
        match state {
            ConnectionState::Disabled => Some(false),
            ConnectionState::Connected if self.active.read().is_some() => Some(true),
            _ => None,
        }
    }

    /// Apply a state transition; `Disabled` is never left
    fn transition(&self, next: ConnectionState, reason: Option<&str>) {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if *state == next || state.is_terminal() {
                return false;
            }
            previous = Some(*state);
            *state = next;
            true
        });
        if let Some(from) = previous {
            log_state_transition(COMPONENT, from, next, reason);
        }
    }

    /// Transition on behalf of an attempt; `false` once `shutdown` cancelled it
    ///
    /// Holding the `in_flight` lock orders this against `shutdown`, so a
    /// cancelled attempt can never overwrite the state of a later one.
    fn attempt_transition(
        &self,
        shutdowns: u64,
        next: ConnectionState,
        reason: Option<&str>,
        finished: bool,
    ) -> bool {
        let mut in_flight = self.in_flight.lock();
        if self.shutdowns.load(Ordering::SeqCst) != shutdowns {
            return false;
        }
        self.transition(next, reason);
        if finished {
            *in_flight = None;
        }
        true
    }

    /// The bounded retry loop behind a single shared attempt
    async fn connect_with_retry(self: Arc<Self>, shutdowns: u64) -> bool {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if !self.attempt_transition(shutdowns, ConnectionState::Connecting, None, false) {
                return false;
            }

            match self.connect_once().await {
                Ok(active) => {
                    let cancelled = {
                        let mut in_flight = self.in_flight.lock();
                        if self.shutdowns.load(Ordering::SeqCst) == shutdowns {
                            if let Some(old) = self.active.write().replace(active) {
                                old.listener.abort();
                            }
                            self.transition(ConnectionState::Connected, None);
                            *in_flight = None;
                            None
                        } else {
                            Some(active)
                        }
                    };

                    return match cancelled {
                        None => {
                            info!(
                                store = %self.connector.describe(),
                                attempt = attempt,
                                "Cache store connected"
                            );
                            true
                        }
                        Some(stray) => {
                            self.discard(stray).await;
                            false
                        }
                    };
                }
                Err(e) => {
                    warn!(
                        store = %self.connector.describe(),
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Cache store connection attempt failed"
                    );
                    if attempt < max_attempts {
                        if !self.attempt_transition(
                            shutdowns,
                            ConnectionState::Disconnected,
                            Some("connect failed"),
                            false,
                        ) {
                            return false;
                        }
                        tokio::time::sleep(self.policy.backoff_for(attempt)).await;
                    }
                }
            }
        }

        self.attempt_transition(
            shutdowns,
            ConnectionState::Disabled,
            Some("connection retries exhausted"),
            true,
        );
        false
    }

    /// Close a connection that finished connecting after `shutdown`
    async fn discard(&self, stray: ActiveConnection<C::Connection>) {
        stray.listener.abort();
        if let Err(e) = stray.connection.close().await {
            debug!(error = %e, "Error while closing cancelled cache store connection");
        }
        debug!(
            generation = stray.generation,
            "Discarded cache store connection completed after shutdown"
        );
    }

    async fn connect_once(self: &Arc<Self>) -> Result<ActiveConnection<C::Connection>, CacheError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (sink, events) = EventSink::channel(generation);

        let connection = tokio::time::timeout(self.connect_timeout, self.connector.connect(sink))
            .await
            .map_err(|_| {
                CacheError::ConnectionError(format!(
                    "connect timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })??;

        let listener = tokio::spawn(listen(Arc::downgrade(self), events));
        Ok(ActiveConnection {
            generation,
            connection,
            listener,
        })
    }

    fn handle_event(&self, event: ConnectionEvent) {
        match event.kind {
            ConnectionEventKind::Disconnected { reason } => {
                let dropped = {
                    let mut active = self.active.write();
                    if active.as_ref().is_some_and(|a| a.generation == event.generation) {
                        active.take()
                    } else {
                        None
                    }
                };
                match dropped {
                    // Dropping the handle detaches this listener; it exits once
                    // the old connection's senders are gone
                    Some(_) => self.transition(ConnectionState::Disconnected, Some(&reason)),
                    None => debug!(
                        generation = event.generation,
                        reason = %reason,
                        "Ignoring disconnect from superseded cache connection"
                    ),
                }
            }
            ConnectionEventKind::Error { message } => {
                debug!(
                    generation = event.generation,
                    message = %message,
                    "Cache store reported an error"
                );
            }
        }
    }
}

/// Background listener: turns store-reported events into state transitions
async fn listen<C: StoreConnector>(
    manager: Weak<ManagerInner<C>>,
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = manager.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn fast_policy(max_attempts: u32) -> ReconnectConfig {
        ReconnectConfig {
            max_attempts,
            backoff_step_ms: 1,
            max_backoff_ms: 5,
        }
    }

    fn manager(store: &MemoryStore, max_attempts: u32) -> ConnectionManager<MemoryStore> {
        ConnectionManager::new(
            store.clone(),
            fast_policy(max_attempts),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_connects_lazily() {
        let store = MemoryStore::new();
        let manager = manager(&store, 3);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(store.connect_attempts(), 0);

        assert!(manager.ensure_connected().await);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.current().is_some());

        // Already connected: no new attempt
        assert!(manager.ensure_connected().await);
        assert_eq!(store.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_disables() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        let manager = manager(&store, 3);

        assert!(!manager.ensure_connected().await);
        assert_eq!(manager.state(), ConnectionState::Disabled);
        assert_eq!(store.connect_attempts(), 3);

        // Terminal: the store coming back does not matter
        store.set_unreachable(false);
        assert!(!manager.ensure_connected().await);
        assert!(manager.acquire().await.is_none());
        assert_eq!(store.connect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        let manager = ConnectionManager::new(
            store.clone(),
            ReconnectConfig {
                max_attempts: 50,
                backoff_step_ms: 10,
                max_backoff_ms: 10,
            },
            Duration::from_secs(1),
        );

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_connected().await })
        };
        tokio::time::sleep(Duration::from_millis(25)).await;
        store.set_unreachable(false);

        assert!(waiter.await.unwrap());
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(store.connect_attempts() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout_counts_as_failure() {
        let store = MemoryStore::new();
        store.set_connect_delay(Duration::from_secs(60));
        let manager = ConnectionManager::new(
            store.clone(),
            fast_policy(2),
            Duration::from_millis(100),
        );

        assert!(!manager.ensure_connected().await);
        assert_eq!(manager.state(), ConnectionState::Disabled);
        assert_eq!(manager.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_store_reported_disconnect() {
        let store = MemoryStore::new();
        let manager = manager(&store, 3);
        let mut states = manager.subscribe();

        assert!(manager.ensure_connected().await);
        store.drop_connections();

        states
            .wait_for(|state| *state == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert!(manager.current().is_none());

        // Next operation reconnects
        assert!(manager.ensure_connected().await);
        assert_eq!(store.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_and_allows_reconnect() {
        let store = MemoryStore::new();
        let manager = manager(&store, 3);

        assert!(manager.ensure_connected().await);
        manager.shutdown().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.current().is_none());

        // Shutting down twice is harmless
        manager.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_in_flight_attempt() {
        let store = MemoryStore::new();
        store.set_connect_delay(Duration::from_millis(50));
        let manager = manager(&store, 3);

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_connected().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.shutdown().await;
        assert!(!pending.await.unwrap());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.current().is_none());

        // The next operation starts a fresh attempt
        assert!(manager.ensure_connected().await);
        assert_eq!(store.connect_attempts(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_retry_loop() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        let manager = ConnectionManager::new(
            store.clone(),
            ReconnectConfig {
                max_attempts: 5,
                backoff_step_ms: 100,
                max_backoff_ms: 100,
            },
            Duration::from_secs(1),
        );

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.ensure_connected().await })
        };
        // First attempt failed; the loop is sleeping before the second
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.shutdown().await;

        assert!(!pending.await.unwrap());
        assert_eq!(store.connect_attempts(), 1);
        // Cancelled, not exhausted
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_keeps_disabled() {
        let store = MemoryStore::new();
        store.set_unreachable(true);
        let manager = manager(&store, 1);

        assert!(!manager.ensure_connected().await);
        manager.shutdown().await;
        assert_eq!(manager.state(), ConnectionState::Disabled);
    }
}
