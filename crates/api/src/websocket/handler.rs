//! WebSocket handler for Axum
//!
//! Upgrades `/ws/chat/:role[/:identity]` and pumps frames between the socket
//! and its [`ChatSession`].

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use supportchat_shared::Role;

use crate::state::AppState;

use super::{
    events::ServerEvent,
    session::{ChatSession, SessionRole},
    state::ChatState,
};

#[derive(Debug, Deserialize)]
pub struct ChatRoute {
    role: String,
    #[serde(default)]
    identity: Option<String>,
}

impl ChatRoute {
    fn session_role(&self) -> Option<SessionRole> {
        let role: Role = self.role.parse().ok()?;
        SessionRole::from_route(role, self.identity.as_deref())
    }
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// Rejects unknown roles and user connections without an identity before upgrading.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Path(route): Path<ChatRoute>,
) -> Result<Response, StatusCode> {
    let Some(role) = route.session_role() else {
        tracing::warn!(role = %route.role, "Rejected chat connection with invalid route");
        return Err(StatusCode::BAD_REQUEST);
    };

    tracing::info!(role = %role.role(), "WebSocket connection upgrade requested");

    let chat = app_state.chat.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, role, chat)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, role: SessionRole, chat: ChatState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut session = ChatSession::open(chat, role, tx).await;
    let session_id = session.session_id();

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // One envelope at a time, in arrival order
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => session.handle_text(&text).await,
            Ok(Message::Close(_)) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Ok(_) => {} // Ping/pong handled by axum, binary ignored
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    tracing::info!(session_id = %session_id, "WebSocket connection closing");
    session.close().await;

    send_task.abort();
}
