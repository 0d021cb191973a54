//! Read receipts
//!
//! Marks the counterpart's messages read and tells the conversation's room.
//! Holds no state of its own beyond the per-message read flag.

use supportchat_shared::{ChatResult, RoomKey, Role, SenderKind};

use super::events::ServerEvent;
use super::state::ChatState;

/// Whose messages a reader acknowledges
fn counterpart(reader: Role) -> SenderKind {
    match reader {
        Role::User => SenderKind::Admin,
        Role::Admin => SenderKind::User,
    }
}

/// Mark the other side's messages in `participant_id`'s conversation as read
/// and broadcast a `messages_read` notice to that conversation's room.
pub async fn acknowledge(state: &ChatState, reader: Role, participant_id: &str) -> ChatResult<u64> {
    let changed = state
        .store
        .mark_read(participant_id, counterpart(reader))
        .await?;

    let room = RoomKey::for_participant(participant_id);
    state
        .rooms
        .broadcast(
            &room,
            ServerEvent::MessagesRead {
                reader,
                email: participant_id.to_string(),
            },
        )
        .await;

    tracing::debug!(
        participant = %participant_id,
        reader = %reader,
        marked = changed,
        "Messages marked read"
    );

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::Connection;
    use std::sync::Arc;
    use supportchat_shared::MemoryMessageStore;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_admin_reads_only_user_messages() {
        let state = ChatState::new(Arc::new(MemoryMessageStore::new()));
        state.store.append("a@x.com", SenderKind::User, "q").await.unwrap();
        state.store.append("a@x.com", SenderKind::Ai, "auto").await.unwrap();
        state.store.append("a@x.com", SenderKind::Admin, "a").await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let room = RoomKey::for_participant("a@x.com");
        state.rooms.join(&room, Arc::new(Connection::new(Role::User, tx))).await;

        assert_eq!(acknowledge(&state, Role::Admin, "a@x.com").await.unwrap(), 1);

        for msg in state.store.list_by_participant("a@x.com").await.unwrap() {
            assert_eq!(msg.is_read, msg.sender_kind == SenderKind::User);
        }
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::MessagesRead {
                reader: Role::Admin,
                email: "a@x.com".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_user_reads_only_admin_messages() {
        let state = ChatState::new(Arc::new(MemoryMessageStore::new()));
        state.store.append("a@x.com", SenderKind::User, "q").await.unwrap();
        state.store.append("a@x.com", SenderKind::Admin, "a").await.unwrap();

        assert_eq!(acknowledge(&state, Role::User, "a@x.com").await.unwrap(), 1);
        assert_eq!(acknowledge(&state, Role::User, "a@x.com").await.unwrap(), 0);

        for msg in state.store.list_by_participant("a@x.com").await.unwrap() {
            assert_eq!(msg.is_read, msg.sender_kind == SenderKind::Admin);
        }
    }
}
