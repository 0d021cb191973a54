//! WebSocket event types and serialization
//!
//! Defines all client-to-server and server-to-client envelopes with type-safe
//! serde serialization. Both directions are tagged by a `type` field.

use serde::{Deserialize, Serialize};
use supportchat_shared::{ChatMessage, Role};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Envelopes sent from client to server
///
/// Required fields are optional at the wire level so that an envelope with a
/// missing field still parses and is dropped by the session, the same way an
/// unknown `type` is.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Send a chat message. Admins must name the target participant in `to`.
    Message {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        to: Option<String>,
    },

    /// Admin switches to a participant's conversation
    GetConversation {
        #[serde(default)]
        email: Option<String>,
    },

    /// Mark the counterpart's messages as read
    ReadMessages {
        #[serde(default)]
        email: Option<String>,
    },
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Envelopes sent from server to client
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full history, sent to a user connection right after it opens
    History { messages: Vec<ChatMessage> },

    /// Full history of the conversation an admin just switched to
    Conversation {
        email: String,
        messages: Vec<ChatMessage>,
    },

    /// A single new message in the room
    Message { message: ChatMessage },

    /// `reader` has read the other side's messages in `email`'s conversation
    MessagesRead { reader: Role, email: String },
}

/// Returns the trimmed value when it is present and not blank
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
