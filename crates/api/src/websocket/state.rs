//! Shared chat state
//!
//! One instance is built at startup and cloned into every connection task. It
//! owns the connection registry, the room directory and the message store, and
//! provides the persist-then-broadcast path every new message goes through.
//!
//! Publishes for the same participant take turns across store and broadcast,
//! so live subscribers see messages in the same order as the stored history.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use supportchat_shared::{ChatMessage, ChatResult, MessageStore, RoomKey, SenderKind};

use super::auto_reply::AutoReplier;
use super::connection::Connection;
use super::events::ServerEvent;
use super::room::RoomDirectory;

/// State shared across all chat connections
#[derive(Clone)]
pub struct ChatState {
    /// All active connections indexed by session_id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    /// Room directory for conversation subscriptions
    pub rooms: Arc<RoomDirectory>,

    /// Durable message history
    pub store: Arc<dyn MessageStore>,

    /// Stand-in responder; `None` disables auto-replies
    pub auto_reply: Option<AutoReplier>,

    /// Per-room turn held from append until broadcast
    publish_turns: Arc<Mutex<HashMap<RoomKey, Arc<Mutex<()>>>>>,
}

impl ChatState {
    /// Create new chat state over a message store
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomDirectory::new()),
            store,
            auto_reply: None,
            publish_turns: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_auto_reply(mut self, replier: AutoReplier) -> Self {
        self.auto_reply = Some(replier);
        self
    }

    /// Persist a message and broadcast it to the participant's room
    pub async fn publish(
        &self,
        participant_id: &str,
        sender_kind: SenderKind,
        content: &str,
    ) -> ChatResult<ChatMessage> {
        let room = RoomKey::for_participant(participant_id);
        let turn = {
            let mut turns = self.publish_turns.lock().await;
            Arc::clone(turns.entry(room.clone()).or_default())
        };

        let result = {
            let _turn = turn.lock().await;
            match self.store.append(participant_id, sender_kind, content).await {
                Ok(message) => {
                    self.rooms
                        .broadcast(
                            &room,
                            ServerEvent::Message {
                                message: message.clone(),
                            },
                        )
                        .await;
                    Ok(message)
                }
                Err(e) => Err(e),
            }
        };

        drop(turn);
        let mut turns = self.publish_turns.lock().await;
        // Only the map holds it once no publish is waiting
        if turns.get(&room).is_some_and(|t| Arc::strong_count(t) == 1) {
            turns.remove(&room);
        }

        result
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            role = %conn.role,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.remove(session_id) {
            tracing::info!(
                session_id = %session_id,
                role = %conn.role,
                remaining_connections = connections.len(),
                "WebSocket connection removed"
            );
        }
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Get statistics about the chat state
    pub async fn get_stats(&self) -> ChatStats {
        let connection_count = self.connection_count().await;
        let room_count = self.rooms.get_room_count().await;

        ChatStats {
            active_connections: connection_count,
            active_rooms: room_count,
        }
    }
}

/// Statistics about live chat connections
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Number of rooms with at least one subscriber
    pub active_rooms: usize,
}
