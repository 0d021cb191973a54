//! Common types used across the support chat relay

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// Roles
// =============================================================================

/// Who authored a stored message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    User,
    Admin,
    Ai,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderKind::User => "user",
            SenderKind::Admin => "admin",
            SenderKind::Ai => "ai",
        }
    }
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(SenderKind::User),
            "admin" => Ok(SenderKind::Admin),
            "ai" => Ok(SenderKind::Ai),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Role of a live connection, fixed at handshake time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Returned when a role or sender kind string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

// =============================================================================
// Messages
// =============================================================================

/// A persisted chat message
///
/// Serialized with the field names the chat clients expect: the participant id
/// travels as `email`, the sender kind as `sender_type` and the creation time
/// as an RFC 3339 `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    #[serde(rename = "email")]
    pub participant_id: String,
    #[serde(rename = "sender_type")]
    pub sender_kind: SenderKind,
    pub content: String,
    #[serde(rename = "timestamp", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_read: bool,
}

// =============================================================================
// Room keys
// =============================================================================

const ROOM_PREFIX: &str = "user_";

/// Broadcast group key derived from a participant id
///
/// The encoding keeps `[A-Za-z0-9._]` and writes every other byte (including
/// `-` itself) as `-` plus two lowercase hex digits, so distinct participants
/// never share a room and the participant can be recovered from the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn for_participant(participant_id: &str) -> Self {
        let mut key = String::with_capacity(ROOM_PREFIX.len() + participant_id.len());
        key.push_str(ROOM_PREFIX);
        for byte in participant_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'.' || byte == b'_' {
                key.push(byte as char);
            } else {
                key.push('-');
                key.push_str(&format!("{:02x}", byte));
            }
        }
        Self(key)
    }

    /// Decode the participant id this key was derived from
    pub fn participant(&self) -> Option<String> {
        let encoded = self.0.strip_prefix(ROOM_PREFIX)?;
        let mut bytes = Vec::with_capacity(encoded.len());
        let mut iter = encoded.bytes();
        while let Some(byte) = iter.next() {
            if byte == b'-' {
                let hi = iter.next()?;
                let lo = iter.next()?;
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex).ok()?;
                bytes.push(u8::from_str_radix(hex, 16).ok()?);
            } else {
                bytes.push(byte);
            }
        }
        String::from_utf8(bytes).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
