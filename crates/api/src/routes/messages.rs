//! Conversation routes
//!
//! HTTP read/send paths over the same store and rooms the live connections use,
//! so anything written here is immediately visible to sockets and vice versa.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use supportchat_shared::{ChatMessage, SenderKind};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// List every participant with a conversation, sorted
pub async fn list_participants(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let participants = state.chat.store.list_distinct_participants().await?;
    Ok(Json(participants))
}

/// Full history for one participant, oldest first
pub async fn list_messages(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let messages = state.chat.store.list_by_participant(&participant_id).await?;
    Ok(Json(messages))
}

/// Send an administrator message to a participant
pub async fn send_message(
    State(state): State<AppState>,
    Path(participant_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<ChatMessage>> {
    let text = req.message.trim();
    if text.is_empty() {
        return Err(ApiError::Validation(
            "Message content cannot be empty".into(),
        ));
    }

    let message = state
        .chat
        .publish(&participant_id, SenderKind::Admin, text)
        .await?;

    tracing::info!(
        participant = %participant_id,
        message_id = message.id,
        "Admin message sent over HTTP"
    );

    Ok(Json(message))
}
