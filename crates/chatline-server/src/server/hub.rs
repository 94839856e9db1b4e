//! Outbound side of the WebSocket transport.
//!
//! Each open socket owns a bounded channel; its writer task drains the
//! channel onto the wire. The hub keeps the sending halves so any task can
//! push an event to any connection without touching the socket itself.

use std::fmt;

use chatline_relay::{ConnectionId, DirectMessage, Outbound, ServerEvent};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Result of pushing an event to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// Event was queued for the connection's writer
    Sent,
    /// No such connection
    NotConnected,
    /// The outbound queue is full; the event was discarded
    ChannelFull,
    /// The writer has gone away; the entry was removed
    ChannelClosed,
}

/// Outbound queues of every open socket, keyed by connection id.
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
    buffer: usize,
}

impl ConnectionHub {
    /// Create a hub whose per-connection queues hold `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Open an outbound queue for a new connection.
    pub fn register(&self, connection_id: ConnectionId) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(self.buffer);
        if self.connections.insert(connection_id, tx).is_some() {
            warn!("Connection id reused while still registered");
        }
        rx
    }

    /// Drop the outbound queue of a closed connection.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Queue an event for a connection without waiting.
    pub fn push(&self, connection_id: &ConnectionId, event: ServerEvent) -> PushResult {
        let sender = match self.connections.get(connection_id) {
            Some(entry) => entry.value().clone(),
            None => {
                debug!(connection = %connection_id, "Connection not open");
                return PushResult::NotConnected;
            }
        };

        match sender.try_send(event) {
            Ok(()) => PushResult::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection = %connection_id, "Outbound queue full, discarding event");
                PushResult::ChannelFull
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection = %connection_id, "Outbound queue closed, removing connection");
                self.connections.remove(connection_id);
                PushResult::ChannelClosed
            }
        }
    }
}

impl Outbound for ConnectionHub {
    fn deliver(&self, connection_id: &ConnectionId, message: DirectMessage) {
        self.push(connection_id, ServerEvent::from(message));
    }
}

impl fmt::Debug for ConnectionHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHub")
            .field("connection_count", &self.connections.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}
