//! WebSocket connection handle
//!
//! The outbound side of a live socket. Rooms hold these handles; the socket's
//! writer task drains the channel.

use tokio::sync::mpsc;
use uuid::Uuid;

use supportchat_shared::Role;

use super::events::ServerEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Role fixed at handshake time
    pub role: Role,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection {
    /// Create a new connection
    pub fn new(role: Role, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            role,
            sender,
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Whether the writer side has gone away
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_receiver_dropped_fails() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(Role::User, tx);

        assert!(!conn.is_closed());
        drop(rx);
        assert!(conn.is_closed());
        assert!(conn
            .send(ServerEvent::History { messages: vec![] })
            .is_err());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = Connection::new(Role::Admin, tx.clone());
        let b = Connection::new(Role::Admin, tx);
        assert_ne!(a.session_id, b.session_id);
    }
}
