//! Conversation room management for pub/sub
//!
//! Maps each participant's room to the connections currently subscribed to it.
//! The outer map is only locked long enough to find or create a room; the
//! subscriber list of each room has its own lock, so joins, leaves and
//! broadcasts on unrelated rooms never wait on each other, and broadcasts on
//! the same room are delivered in call order.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use supportchat_shared::RoomKey;

use super::connection::Connection;
use super::events::ServerEvent;

#[derive(Default)]
struct Subscribers {
    conns: Vec<Arc<Connection>>,
    /// Set once the room has been dropped from the directory
    retired: bool,
}

#[derive(Default)]
struct Room {
    subscribers: Mutex<Subscribers>,
}

/// Manages conversation "rooms" for broadcasting events
pub struct RoomDirectory {
    rooms: RwLock<HashMap<RoomKey, Arc<Room>>>,
}

impl RoomDirectory {
    /// Create a new room directory
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    async fn lookup(&self, room: &RoomKey) -> Option<Arc<Room>> {
        let rooms = self.rooms.read().await;
        rooms.get(room).cloned()
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub async fn join(&self, room: &RoomKey, conn: Arc<Connection>) {
        loop {
            let entry = {
                let mut rooms = self.rooms.write().await;
                Arc::clone(rooms.entry(room.clone()).or_default())
            };

            let mut subs = entry.subscribers.lock().await;
            if subs.retired {
                // Lost a race with the last leave; the entry is about to be removed
                drop(subs);
                tokio::task::yield_now().await;
                continue;
            }

            if !subs.conns.iter().any(|c| c.session_id == conn.session_id) {
                subs.conns.push(Arc::clone(&conn));
            }

            tracing::debug!(
                room = %room,
                session_id = %conn.session_id,
                room_size = subs.conns.len(),
                "Connection joined room"
            );
            return;
        }
    }

    /// Remove a connection from a room, dropping the room once it is empty
    pub async fn leave(&self, room: &RoomKey, session_id: &Uuid) {
        let Some(entry) = self.lookup(room).await else {
            return;
        };

        let mut subs = entry.subscribers.lock().await;
        subs.conns.retain(|c| c.session_id != *session_id);

        if !subs.conns.is_empty() {
            tracing::debug!(
                room = %room,
                session_id = %session_id,
                room_size = subs.conns.len(),
                "Connection left room"
            );
            return;
        }

        if subs.retired {
            return;
        }
        subs.retired = true;
        drop(subs);

        let mut rooms = self.rooms.write().await;
        if rooms.get(room).is_some_and(|current| Arc::ptr_eq(current, &entry)) {
            rooms.remove(room);
        }
        tracing::debug!(room = %room, "Removed empty room");
    }

    /// Broadcast an event to all connections in a room
    ///
    /// Delivery failures are isolated per subscriber and only logged.
    /// Returns the number of connections the event was handed to.
    pub async fn broadcast(&self, room: &RoomKey, event: ServerEvent) -> usize {
        let Some(entry) = self.lookup(room).await else {
            tracing::debug!(room = %room, "No subscribers in room");
            return 0;
        };

        let subs = entry.subscribers.lock().await;
        let mut success_count = 0;
        let mut failed_count = 0;

        for conn in &subs.conns {
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        session_id = %conn.session_id,
                        room = %room,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            room = %room,
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to room"
        );

        success_count
    }

    /// Rooms a connection is currently subscribed to
    pub async fn subscriptions_of(&self, session_id: &Uuid) -> Vec<RoomKey> {
        let entries: Vec<(RoomKey, Arc<Room>)> = {
            let rooms = self.rooms.read().await;
            rooms
                .iter()
                .map(|(key, room)| (key.clone(), Arc::clone(room)))
                .collect()
        };

        let mut subscribed = Vec::new();
        for (key, room) in entries {
            let subs = room.subscribers.lock().await;
            if subs.conns.iter().any(|c| c.session_id == *session_id) {
                subscribed.push(key);
            }
        }
        subscribed.sort();
        subscribed
    }

    /// Get room size (number of connections) for a room
    #[cfg(test)]
    pub async fn get_room_size(&self, room: &RoomKey) -> usize {
        match self.lookup(room).await {
            Some(entry) => entry.subscribers.lock().await.conns.len(),
            None => 0,
        }
    }

    /// Get total number of active rooms
    pub async fn get_room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}
