//! Per-connection chat session
//!
//! A session is owned by its socket task and is the only place its role and
//! current room live. Other connections are reached exclusively through the
//! room directory and the message store.
//!
//! Lifecycle: `Connecting -> Active -> Closed`. A user session joins its own
//! room on open and never changes it. An admin session starts with no room and
//! moves between conversations with `get_conversation`, always leaving the old
//! room before joining the new one.

use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use supportchat_shared::{ChatMessage, Role, RoomKey, SenderKind};

use super::connection::Connection;
use super::events::{non_blank, ClientEvent, ServerEvent};
use super::receipts;
use super::state::ChatState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Closed,
}

/// A conversation an admin is currently subscribed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewing {
    pub participant_id: String,
    pub room: RoomKey,
}

impl Viewing {
    fn of(participant_id: &str) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            room: RoomKey::for_participant(participant_id),
        }
    }
}

/// Role-specific session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRole {
    User { participant_id: String, room: RoomKey },
    Admin { viewing: Option<Viewing> },
}

impl SessionRole {
    /// Build from the connection's route parameters.
    ///
    /// Users need a non-blank identity; any identity given to an admin is ignored.
    pub fn from_route(role: Role, identity: Option<&str>) -> Option<Self> {
        match role {
            Role::User => {
                let participant_id = non_blank(identity)?;
                Some(SessionRole::User {
                    participant_id: participant_id.to_string(),
                    room: RoomKey::for_participant(participant_id),
                })
            }
            Role::Admin => Some(SessionRole::Admin { viewing: None }),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            SessionRole::User { .. } => Role::User,
            SessionRole::Admin { .. } => Role::Admin,
        }
    }
}

pub struct ChatSession {
    chat: ChatState,
    conn: Arc<Connection>,
    role: SessionRole,
    state: SessionState,
}

impl ChatSession {
    /// Register the connection and bring the session to `Active`.
    ///
    /// User sessions join their room and receive their history before this returns.
    pub async fn open(
        chat: ChatState,
        role: SessionRole,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        let conn = chat.add_connection(Connection::new(role.role(), sender)).await;
        let mut session = Self {
            chat,
            conn,
            role,
            state: SessionState::Connecting,
        };

        if let SessionRole::User {
            participant_id,
            room,
        } = &session.role
        {
            session.chat.rooms.join(room, Arc::clone(&session.conn)).await;
            session.state = SessionState::Active;

            if let Some(messages) = session.load_history(participant_id).await {
                session.reply(ServerEvent::History { messages });
            }
        } else {
            session.state = SessionState::Active;
        }

        tracing::info!(
            session_id = %session.conn.session_id,
            role = %session.role.role(),
            "Chat session active"
        );

        session
    }

    pub fn session_id(&self) -> Uuid {
        self.conn.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> &SessionRole {
        &self.role
    }

    /// The room this session currently receives broadcasts from
    pub fn active_room(&self) -> Option<&RoomKey> {
        match &self.role {
            SessionRole::User { room, .. } => Some(room),
            SessionRole::Admin { viewing } => viewing.as_ref().map(|v| &v.room),
        }
    }

    /// Parse and dispatch one inbound text frame. Malformed frames are dropped.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.conn.session_id,
                    error = %e,
                    "Dropping unparsable client event"
                );
            }
        }
    }

    pub async fn handle_event(&mut self, event: ClientEvent) {
        if self.state != SessionState::Active {
            return;
        }

        let own_identity = match &self.role {
            SessionRole::User { participant_id, .. } => Some(participant_id.clone()),
            SessionRole::Admin { .. } => None,
        };

        match (own_identity, event) {
            (Some(participant_id), ClientEvent::Message { message, .. }) => {
                if let Some(text) = non_blank(message.as_deref()) {
                    self.user_message(&participant_id, text).await;
                }
            }

            (None, ClientEvent::Message { message, to }) => {
                match (non_blank(to.as_deref()), non_blank(message.as_deref())) {
                    (Some(target), Some(text)) => self.admin_message(target, text).await,
                    _ => self.drop_event("message without target or text"),
                }
            }

            (None, ClientEvent::GetConversation { email }) => match non_blank(email.as_deref()) {
                Some(target) => self.switch_conversation(target).await,
                None => self.drop_event("get_conversation without email"),
            },

            (Some(participant_id), ClientEvent::ReadMessages { .. }) => {
                self.read_messages(Role::User, &participant_id).await;
            }

            (None, ClientEvent::ReadMessages { email }) => match non_blank(email.as_deref()) {
                Some(target) => self.read_messages(Role::Admin, target).await,
                None => self.drop_event("read_messages without email"),
            },

            (Some(_), ClientEvent::GetConversation { .. }) => {
                self.drop_event("get_conversation from user");
            }
        }
    }

    /// Leave every room and deregister. Further events are ignored.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        let session_id = self.conn.session_id;
        match &mut self.role {
            SessionRole::User { room, .. } => {
                self.chat.rooms.leave(room, &session_id).await;
            }
            SessionRole::Admin { viewing } => {
                if let Some(current) = viewing.take() {
                    self.chat.rooms.leave(&current.room, &session_id).await;
                }
            }
        }
        self.chat.remove_connection(&session_id).await;
    }

    async fn user_message(&self, participant_id: &str, text: &str) {
        if let Err(e) = self.chat.publish(participant_id, SenderKind::User, text).await {
            tracing::error!(
                error = %e,
                participant = %participant_id,
                "Failed to store user message"
            );
            return;
        }

        let Some(replier) = &self.chat.auto_reply else {
            return;
        };

        match self.chat.store.has_admin_replied(participant_id).await {
            Ok(true) => {}
            Ok(false) => {
                // Detached; the receive loop does not wait for the completion
                replier.schedule(
                    self.chat.clone(),
                    participant_id.to_string(),
                    text.to_string(),
                );
                tracing::debug!(participant = %participant_id, "Auto-reply scheduled");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    participant = %participant_id,
                    "Failed to check for admin replies"
                );
            }
        }
    }

    async fn admin_message(&self, target: &str, text: &str) {
        if let Err(e) = self.chat.publish(target, SenderKind::Admin, text).await {
            tracing::error!(error = %e, participant = %target, "Failed to store admin message");
        }
    }

    async fn switch_conversation(&mut self, target: &str) {
        let session_id = self.conn.session_id;
        let next = Viewing::of(target);

        let SessionRole::Admin { viewing } = &mut self.role else {
            return;
        };
        if let Some(previous) = viewing.take() {
            self.chat.rooms.leave(&previous.room, &session_id).await;
        }
        self.chat.rooms.join(&next.room, Arc::clone(&self.conn)).await;
        *viewing = Some(next);

        tracing::debug!(
            session_id = %session_id,
            participant = %target,
            "Admin switched conversation"
        );

        if let Some(messages) = self.load_history(target).await {
            self.reply(ServerEvent::Conversation {
                email: target.to_string(),
                messages,
            });
        }
    }

    async fn read_messages(&self, reader: Role, participant_id: &str) {
        if let Err(e) = receipts::acknowledge(&self.chat, reader, participant_id).await {
            tracing::error!(
                error = %e,
                participant = %participant_id,
                "Failed to mark messages read"
            );
        }
    }

    async fn load_history(&self, participant_id: &str) -> Option<Vec<ChatMessage>> {
        match self.chat.store.list_by_participant(participant_id).await {
            Ok(messages) => Some(messages),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    participant = %participant_id,
                    "Failed to load history"
                );
                None
            }
        }
    }

    /// Send privately to this connection
    fn reply(&self, event: ServerEvent) {
        if self.conn.send(event).is_err() {
            tracing::warn!(session_id = %self.conn.session_id, "Reply dropped, connection closed");
        }
    }

    fn drop_event(&self, reason: &'static str) {
        tracing::debug!(session_id = %self.conn.session_id, reason, "Ignoring client event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::auto_reply::tests::StubCompletion;
    use crate::websocket::auto_reply::AutoReplier;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use supportchat_shared::MemoryMessageStore;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn chat_with(completion: Arc<StubCompletion>) -> ChatState {
        ChatState::new(Arc::new(MemoryMessageStore::new()))
            .with_auto_reply(AutoReplier::new(completion))
    }

    async fn user(chat: &ChatState, email: &str) -> (ChatSession, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let role = SessionRole::from_route(Role::User, Some(email)).unwrap();
        (ChatSession::open(chat.clone(), role, tx).await, rx)
    }

    async fn admin(chat: &ChatState) -> (ChatSession, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let role = SessionRole::from_route(Role::Admin, None).unwrap();
        (ChatSession::open(chat.clone(), role, tx).await, rx)
    }

    async fn next(rx: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    fn message_of(event: ServerEvent) -> ChatMessage {
        match event {
            ServerEvent::Message { message } => message,
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[test]
    fn test_route_validation() {
        assert!(SessionRole::from_route(Role::User, None).is_none());
        assert!(SessionRole::from_route(Role::User, Some("  ")).is_none());
        assert_eq!(
            SessionRole::from_route(Role::Admin, Some("ignored@x.com")),
            Some(SessionRole::Admin { viewing: None })
        );
    }

    #[tokio::test]
    async fn test_user_open_joins_room_and_gets_history() {
        let chat = chat_with(Arc::new(StubCompletion::echo()));
        chat.store.append("a@x.com", SenderKind::User, "earlier").await.unwrap();

        let (session, mut rx) = user(&chat, "a@x.com").await;
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.active_room(), Some(&RoomKey::for_participant("a@x.com")));

        match next(&mut rx).await {
            ServerEvent::History { messages } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].content, "earlier");
            }
            other => panic!("expected history, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_admin_open_joins_nothing() {
        let chat = chat_with(Arc::new(StubCompletion::echo()));
        let (session, mut rx) = admin(&chat).await;

        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.active_room(), None);
        assert!(chat.rooms.subscriptions_of(&session.session_id()).await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_first_user_message_triggers_auto_reply() {
        let completion = Arc::new(StubCompletion::echo());
        let chat = chat_with(Arc::clone(&completion));
        let (mut session, mut rx) = user(&chat, "a@x.com").await;
        next(&mut rx).await; // history

        session.handle_text(r#"{"type":"message","message":"  hi  "}"#).await;

        let own = message_of(next(&mut rx).await);
        assert_eq!(own.sender_kind, SenderKind::User);
        assert_eq!(own.content, "hi");
        assert!(!own.is_read);

        let auto = message_of(next(&mut rx).await);
        assert_eq!(auto.sender_kind, SenderKind::Ai);
        assert_eq!(auto.content, "auto: hi");

        let history = chat.store.list_by_participant("a@x.com").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].sender_kind, SenderKind::Ai);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_auto_reply_after_admin_has_replied() {
        let completion = Arc::new(StubCompletion::echo());
        let chat = chat_with(Arc::clone(&completion));
        chat.store.append("a@x.com", SenderKind::Admin, "a human is here").await.unwrap();

        let (mut session, mut rx) = user(&chat, "a@x.com").await;
        next(&mut rx).await; // history

        session.handle_text(r#"{"type":"message","message":"hi"}"#).await;
        assert_eq!(message_of(next(&mut rx).await).content, "hi");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
        assert_eq!(chat.store.list_by_participant("a@x.com").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_slow_completion_does_not_block_receive_loop() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let completion = Arc::new(StubCompletion::gated(Arc::clone(&gate)));
        let chat = chat_with(Arc::clone(&completion));
        let (mut session, mut rx) = user(&chat, "a@x.com").await;
        next(&mut rx).await; // history

        session.handle_text(r#"{"type":"message","message":"one"}"#).await;
        session.handle_text(r#"{"type":"message","message":"two"}"#).await;

        assert_eq!(message_of(next(&mut rx).await).content, "one");
        assert_eq!(message_of(next(&mut rx).await).content, "two");

        // Release both in-flight completions
        gate.notify_waiters();
        gate.notify_one();
        let first = message_of(next(&mut rx).await);
        assert_eq!(first.sender_kind, SenderKind::Ai);
    }

    #[tokio::test]
    async fn test_admin_reply_during_completion_does_not_suppress_auto_reply() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let completion = Arc::new(StubCompletion::gated(Arc::clone(&gate)));
        let chat = chat_with(Arc::clone(&completion));
        let (mut user_session, mut rx) = user(&chat, "a@x.com").await;
        next(&mut rx).await; // history
        let (mut admin_session, _admin_rx) = admin(&chat).await;

        user_session.handle_text(r#"{"type":"message","message":"hi"}"#).await;
        assert_eq!(message_of(next(&mut rx).await).sender_kind, SenderKind::User);

        // A human answers while the completion is still outstanding
        admin_session
            .handle_text(r#"{"type":"message","message":"here","to":"a@x.com"}"#)
            .await;
        assert_eq!(message_of(next(&mut rx).await).sender_kind, SenderKind::Admin);

        gate.notify_one();
        assert_eq!(message_of(next(&mut rx).await).sender_kind, SenderKind::Ai);

        let kinds: Vec<SenderKind> = chat
            .store
            .list_by_participant("a@x.com")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.sender_kind)
            .collect();
        assert_eq!(kinds, vec![SenderKind::User, SenderKind::Admin, SenderKind::Ai]);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_and_malformed_envelopes_are_ignored() {
        let completion = Arc::new(StubCompletion::echo());
        let chat = chat_with(Arc::clone(&completion));
        let (mut session, mut rx) = user(&chat, "a@x.com").await;
        next(&mut rx).await; // history

        session.handle_text(r#"{"type":"message","message":"   "}"#).await;
        session.handle_text(r#"{"type":"message"}"#).await;
        session.handle_text(r#"{"type":"typing"}"#).await;
        session.handle_text("{not json").await;
        session.handle_text(r#"{"type":"get_conversation","email":"b@x.com"}"#).await;

        assert!(rx.try_recv().is_err());
        assert!(chat.store.list_by_participant("a@x.com").await.unwrap().is_empty());
        assert_eq!(session.active_room(), Some(&RoomKey::for_participant("a@x.com")));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_admin_message_goes_to_target_room() {
        let chat = chat_with(Arc::new(StubCompletion::echo()));
        let (_user_a, mut rx_a) = user(&chat, "a@x.com").await;
        next(&mut rx_a).await;
        let (mut admin, mut rx_admin) = admin(&chat).await;

        admin
            .handle_text(r#"{"type":"message","to":"a@x.com","message":"hello"}"#)
            .await;

        let delivered = message_of(next(&mut rx_a).await);
        assert_eq!(delivered.sender_kind, SenderKind::Admin);
        assert_eq!(delivered.participant_id, "a@x.com");
        // Not viewing that room, so the admin does not get an echo
        assert!(rx_admin.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_admin_message_requires_target_and_text() {
        let chat = chat_with(Arc::new(StubCompletion::echo()));
        let (mut admin, _rx) = admin(&chat).await;

        admin.handle_text(r#"{"type":"message","message":"hello"}"#).await;
        admin.handle_text(r#"{"type":"message","to":"a@x.com","message":" "}"#).await;

        assert!(chat.store.list_distinct_participants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_switching_conversations() {
        let chat = chat_with(Arc::new(StubCompletion::echo()));
        chat.store.append("a@x.com", SenderKind::User, "from a").await.unwrap();
        let (_user_a, mut rx_a) = user(&chat, "a@x.com").await;
        next(&mut rx_a).await;
        let (mut admin, mut rx_admin) = admin(&chat).await;

        admin
            .handle_text(r#"{"type":"get_conversation","email":"a@x.com"}"#)
            .await;
        match next(&mut rx_admin).await {
            ServerEvent::Conversation { email, messages } => {
                assert_eq!(email, "a@x.com");
                assert_eq!(messages.len(), 1);
            }
            other => panic!("expected conversation, got {other:?}"),
        }

        admin
            .handle_text(r#"{"type":"get_conversation","email":"b@x.com"}"#)
            .await;
        match next(&mut rx_admin).await {
            ServerEvent::Conversation { email, messages } => {
                assert_eq!(email, "b@x.com");
                assert!(messages.is_empty());
            }
            other => panic!("expected conversation, got {other:?}"),
        }

        let b_room = RoomKey::for_participant("b@x.com");
        assert_eq!(chat.rooms.subscriptions_of(&admin.session_id()).await, vec![b_room.clone()]);
        assert_eq!(admin.active_room(), Some(&b_room));

        chat.publish("a@x.com", SenderKind::Admin, "later").await.unwrap();
        assert_eq!(message_of(next(&mut rx_a).await).content, "later");
        assert!(rx_admin.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_admin_viewing_room_sees_user_messages() {
        let chat = ChatState::new(Arc::new(MemoryMessageStore::new()));
        let (mut user_a, mut rx_a) = user(&chat, "a@x.com").await;
        next(&mut rx_a).await;
        let (mut admin, mut rx_admin) = admin(&chat).await;
        admin
            .handle_text(r#"{"type":"get_conversation","email":"a@x.com"}"#)
            .await;
        next(&mut rx_admin).await; // conversation

        user_a.handle_text(r#"{"type":"message","message":"help"}"#).await;

        let seen_by_user = message_of(next(&mut rx_a).await);
        let seen_by_admin = message_of(next(&mut rx_admin).await);
        assert_eq!(seen_by_user, seen_by_admin);
    }

    #[tokio::test]
    async fn test_read_messages_from_both_sides() {
        let chat = ChatState::new(Arc::new(MemoryMessageStore::new()));
        chat.store.append("a@x.com", SenderKind::User, "q").await.unwrap();
        chat.store.append("a@x.com", SenderKind::Ai, "bot").await.unwrap();
        chat.store.append("a@x.com", SenderKind::Admin, "a").await.unwrap();

        let (mut user_a, mut rx_a) = user(&chat, "a@x.com").await;
        next(&mut rx_a).await;
        let (mut admin, _rx_admin) = admin(&chat).await;

        admin
            .handle_text(r#"{"type":"read_messages","email":"a@x.com"}"#)
            .await;
        assert_eq!(
            next(&mut rx_a).await,
            ServerEvent::MessagesRead {
                reader: Role::Admin,
                email: "a@x.com".to_string()
            }
        );
        let history = chat.store.list_by_participant("a@x.com").await.unwrap();
        assert!(history[0].is_read);
        assert!(!history[1].is_read);
        assert!(!history[2].is_read);

        user_a.handle_text(r#"{"type":"read_messages"}"#).await;
        assert_eq!(
            next(&mut rx_a).await,
            ServerEvent::MessagesRead {
                reader: Role::User,
                email: "a@x.com".to_string()
            }
        );
        let history = chat.store.list_by_participant("a@x.com").await.unwrap();
        assert!(history[2].is_read);
        assert!(!history[1].is_read);
    }

    #[tokio::test]
    async fn test_close_leaves_rooms_and_ignores_further_events() {
        let chat = chat_with(Arc::new(StubCompletion::echo()));
        let (mut user_a, _rx_a) = user(&chat, "a@x.com").await;
        let (mut admin, _rx_admin) = admin(&chat).await;
        admin
            .handle_text(r#"{"type":"get_conversation","email":"b@x.com"}"#)
            .await;
        assert_eq!(chat.get_stats().await.active_rooms, 2);

        user_a.close().await;
        admin.close().await;
        assert_eq!(user_a.state(), SessionState::Closed);
        assert_eq!(chat.get_stats().await.active_rooms, 0);
        assert_eq!(chat.connection_count().await, 0);

        user_a.handle_text(r#"{"type":"message","message":"late"}"#).await;
        assert!(chat.store.list_by_participant("a@x.com").await.unwrap().is_empty());
    }
}
