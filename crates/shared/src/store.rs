//! Message store
//!
//! Durable, append-only record of chat messages keyed by participant. The only
//! mutation after insert is the read flag.
//!
//! Two implementations share the [`MessageStore`] contract:
//! - [`PgMessageStore`] for Postgres deployments
//! - [`MemoryMessageStore`] for single-process runs and tests
//!
//! Both assign `created_at` themselves and keep it strictly increasing per
//! participant, so concurrent writers (user, admin, auto-reply) never produce
//! an out-of-order history.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;

use crate::error::{ChatError, ChatResult};
use crate::types::{ChatMessage, SenderKind};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return the stored record.
    ///
    /// Fails with [`ChatError::Validation`] if `content` is blank.
    async fn append(
        &self,
        participant_id: &str,
        sender_kind: SenderKind,
        content: &str,
    ) -> ChatResult<ChatMessage>;

    /// All messages for a participant, oldest first. Unknown participants yield an empty list.
    async fn list_by_participant(&self, participant_id: &str) -> ChatResult<Vec<ChatMessage>>;

    /// Every participant with at least one message, deduplicated and sorted.
    async fn list_distinct_participants(&self) -> ChatResult<Vec<String>>;

    /// Flag all unread messages from `sender_kind` for this participant as read.
    ///
    /// Returns how many messages changed state.
    async fn mark_read(&self, participant_id: &str, sender_kind: SenderKind) -> ChatResult<u64>;

    /// Whether an administrator has ever written to this participant.
    async fn has_admin_replied(&self, participant_id: &str) -> ChatResult<bool>;

    /// Check the backing storage is reachable.
    async fn ping(&self) -> ChatResult<()>;
}

fn validate_content(content: &str) -> ChatResult<()> {
    if content.trim().is_empty() {
        return Err(ChatError::Validation(
            "Message content cannot be empty".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Postgres
// =============================================================================

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    participant_id: String,
    sender_kind: String,
    content: String,
    created_at: OffsetDateTime,
    is_read: bool,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = ChatError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let sender_kind = row
            .sender_kind
            .parse()
            .map_err(|e| ChatError::Corrupt(format!("message {}: {}", row.id, e)))?;

        Ok(ChatMessage {
            id: row.id,
            participant_id: row.participant_id,
            sender_kind,
            content: row.content,
            created_at: row.created_at,
            is_read: row.is_read,
        })
    }
}

/// Message store backed by the `chat_messages` table
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(
        &self,
        participant_id: &str,
        sender_kind: SenderKind,
        content: &str,
    ) -> ChatResult<ChatMessage> {
        validate_content(content)?;

        let mut tx = self.pool.begin().await?;

        // Serialize writers per participant so created_at stays strictly increasing
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(participant_id)
            .execute(&mut *tx)
            .await?;

        let row: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (participant_id, sender_kind, content, created_at)
            VALUES (
                $1, $2, $3,
                GREATEST(
                    clock_timestamp(),
                    COALESCE(
                        (SELECT MAX(created_at) + INTERVAL '1 microsecond'
                         FROM chat_messages WHERE participant_id = $1),
                        clock_timestamp()
                    )
                )
            )
            RETURNING id, participant_id, sender_kind, content, created_at, is_read
            "#,
        )
        .bind(participant_id)
        .bind(sender_kind.as_str())
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            participant = %participant_id,
            sender_kind = %sender_kind,
            message_id = row.id,
            "Stored chat message"
        );

        row.try_into()
    }

    async fn list_by_participant(&self, participant_id: &str) -> ChatResult<Vec<ChatMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, participant_id, sender_kind, content, created_at, is_read
            FROM chat_messages
            WHERE participant_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(participant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChatMessage::try_from).collect()
    }

    async fn list_distinct_participants(&self) -> ChatResult<Vec<String>> {
        let participants = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT participant_id COLLATE "C" AS participant_id
            FROM chat_messages
            ORDER BY 1
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }

    async fn mark_read(&self, participant_id: &str, sender_kind: SenderKind) -> ChatResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE chat_messages
            SET is_read = TRUE
            WHERE participant_id = $1 AND sender_kind = $2 AND NOT is_read
            "#,
        )
        .bind(participant_id)
        .bind(sender_kind.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn has_admin_replied(&self, participant_id: &str) -> ChatResult<bool> {
        let replied = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM chat_messages WHERE participant_id = $1 AND sender_kind = 'admin')",
        )
        .bind(participant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(replied)
    }

    async fn ping(&self) -> ChatResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    messages: Vec<ChatMessage>,
    last_created: HashMap<String, OffsetDateTime>,
    next_id: i64,
}

/// Process-local message store
#[derive(Default)]
pub struct MemoryMessageStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(
        &self,
        participant_id: &str,
        sender_kind: SenderKind,
        content: &str,
    ) -> ChatResult<ChatMessage> {
        validate_content(content)?;

        let mut inner = self.inner.write().await;
        let now = OffsetDateTime::now_utc();
        let created_at = match inner.last_created.get(participant_id) {
            Some(last) if *last >= now => *last + Duration::microseconds(1),
            _ => now,
        };
        inner.next_id += 1;

        let message = ChatMessage {
            id: inner.next_id,
            participant_id: participant_id.to_string(),
            sender_kind,
            content: content.to_string(),
            created_at,
            is_read: false,
        };
        inner
            .last_created
            .insert(participant_id.to_string(), created_at);
        inner.messages.push(message.clone());

        Ok(message)
    }

    async fn list_by_participant(&self, participant_id: &str) -> ChatResult<Vec<ChatMessage>> {
        let inner = self.inner.read().await;
        // Insertion order is already created_at order per participant
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.participant_id == participant_id)
            .cloned()
            .collect())
    }

    async fn list_distinct_participants(&self) -> ChatResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut participants: Vec<String> = inner.last_created.keys().cloned().collect();
        participants.sort();
        Ok(participants)
    }

    async fn mark_read(&self, participant_id: &str, sender_kind: SenderKind) -> ChatResult<u64> {
        let mut inner = self.inner.write().await;
        let mut changed = 0;
        for message in inner.messages.iter_mut().filter(|m| {
            m.participant_id == participant_id && m.sender_kind == sender_kind && !m.is_read
        }) {
            message.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn has_admin_replied(&self, participant_id: &str) -> ChatResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .any(|m| m.participant_id == participant_id && m.sender_kind == SenderKind::Admin))
    }

    async fn ping(&self) -> ChatResult<()> {
        Ok(())
    }
}
