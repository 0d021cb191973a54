//! Stand-in replies while no administrator has answered
//!
//! Each reply runs as a detached task so the originating connection keeps
//! reading envelopes. The task is not cancelled when that connection closes;
//! if nobody is subscribed by the time it finishes, the broadcast reaches no
//! one and the reply is still in the participant's history.

use std::sync::Arc;
use tokio::task::JoinHandle;

use supportchat_shared::SenderKind;

use super::state::ChatState;
use crate::completion::CompletionService;

/// Schedules completion-backed replies
#[derive(Clone)]
pub struct AutoReplier {
    completion: Arc<dyn CompletionService>,
}

impl AutoReplier {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self { completion }
    }

    /// Spawn a reply to `prompt` for `participant_id` and return immediately.
    ///
    /// The admin-reply gate is the caller's job and is not re-checked once the
    /// completion returns.
    pub fn schedule(
        &self,
        state: ChatState,
        participant_id: String,
        prompt: String,
    ) -> JoinHandle<()> {
        let completion = Arc::clone(&self.completion);
        tokio::spawn(async move {
            reply(completion.as_ref(), &state, &participant_id, &prompt).await;
        })
    }
}

async fn reply(
    completion: &dyn CompletionService,
    state: &ChatState,
    participant_id: &str,
    prompt: &str,
) {
    let text = match completion.complete(prompt).await {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(
                error = %e,
                participant = %participant_id,
                "Auto-reply completion failed"
            );
            return;
        }
    };

    match state.publish(participant_id, SenderKind::Ai, &text).await {
        Ok(message) => {
            tracing::info!(
                participant = %participant_id,
                message_id = message.id,
                "Auto-reply delivered"
            );
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                participant = %participant_id,
                "Failed to store auto-reply"
            );
        }
    }
}
