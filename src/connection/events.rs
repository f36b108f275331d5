//! Store-reported connection status events
//!
//! Each established connection gets an [`EventSink`] tagged with the
//! connection's generation. The store reports drops and errors through it;
//! a listener task owned by the connection manager turns them into state
//! transitions. Events for a superseded generation are ignored.

use tokio::sync::mpsc;

/// What the store observed about its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEventKind {
    /// The transport is gone; the handle must not be reused
    Disconnected { reason: String },
    /// Non-fatal error worth logging; the connection stays up
    Error { message: String },
}

/// An event bound to the connection generation that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub generation: u64,
    pub kind: ConnectionEventKind,
}

/// Sending half handed to a store connection when it is established
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl EventSink {
    pub(crate) fn channel(generation: u64) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { generation, tx }, rx)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report that the connection dropped
    pub fn disconnected(&self, reason: impl Into<String>) {
        self.emit(ConnectionEventKind::Disconnected {
            reason: reason.into(),
        });
    }

    /// Report a store error that did not drop the connection
    pub fn error(&self, message: impl Into<String>) {
        self.emit(ConnectionEventKind::Error {
            message: message.into(),
        });
    }

    fn emit(&self, kind: ConnectionEventKind) {
        // The listener is gone once the manager shut down; nothing to notify
        let _ = self.tx.send(ConnectionEvent {
            generation: self.generation,
            kind,
        });
    }
}
