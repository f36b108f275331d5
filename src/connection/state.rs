//! Connection state of the shared store handle

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the single store connection owned by a [`super::ConnectionManager`]
///
/// ```text
/// Disconnected --attempt--> Connecting --success--> Connected
/// Connecting --failure, retries remaining--> Disconnected (after backoff)
/// Connecting --failure, retries exhausted--> Disabled (terminal)
/// Connected --store-reported disconnect--> Disconnected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection; the next operation starts an attempt
    Disconnected,
    /// An attempt (or its backoff loop) is in flight
    Connecting,
    /// A live connection is available
    Connected,
    /// Retries exhausted; no further attempts for the process lifetime
    Disabled,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disabled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
