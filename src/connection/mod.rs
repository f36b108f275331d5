//! # Store Connection Lifecycle
//!
//! [`ConnectionManager`] owns the single connection; everything else asks it
//! for a handle and never mutates connection state directly. The state
//! machine is documented on [`ConnectionState`].

pub mod events;
pub mod manager;
pub mod state;

pub use events::{ConnectionEvent, ConnectionEventKind, EventSink};
pub use manager::ConnectionManager;
pub use state::ConnectionState;
