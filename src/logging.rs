//! # Structured Logging Module
//!
//! Environment-aware structured logging for the cache handler. Hosts that
//! already install a global subscriber keep theirs; this module only fills
//! the gap for standalone use (the admin binary, tests, embedded services).

use crate::connection::ConnectionState;
use crate::error::CacheError;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// `RUST_LOG` wins when set. Otherwise the level follows the environment
/// detected from `RENDER_CACHE_ENV` / `APP_ENV`. Set
/// `RENDER_CACHE_LOG_FORMAT=json` for JSON lines.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = std::env::var("RENDER_CACHE_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        // A global subscriber may already be set by the host
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
            return;
        }

        tracing::info!(
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

fn get_environment() -> String {
    std::env::var("RENDER_CACHE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log a connection state transition
///
/// Transitions into `Disabled` are errors (caching is off until restart),
/// drops out of `Connected` are warnings, everything else is informational.
pub fn log_state_transition(
    component: &str,
    from: ConnectionState,
    to: ConnectionState,
    reason: Option<&str>,
) {
    match (from, to) {
        (_, ConnectionState::Disabled) => tracing::error!(
            component = component,
            from = %from,
            to = %to,
            reason = reason,
            "Cache store disabled for the lifetime of this process"
        ),
        (ConnectionState::Connected, ConnectionState::Disconnected) => tracing::warn!(
            component = component,
            from = %from,
            to = %to,
            reason = reason,
            "Cache store connection lost"
        ),
        _ => tracing::info!(
            component = component,
            from = %from,
            to = %to,
            reason = reason,
            "Cache store connection state changed"
        ),
    }
}

/// Log a swallowed cache failure
pub fn log_cache_failure(operation: &str, subject: &str, error: &CacheError) {
    tracing::warn!(
        operation = operation,
        subject = subject,
        error_kind = error.kind(),
        error = %error,
        "Cache operation failed, continuing without cache"
    );
}
