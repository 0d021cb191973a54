//! Completion service client
//!
//! Talks to an OpenAI-compatible `/v1/chat/completions` endpoint (for example a
//! local llama.cpp server) to produce stand-in replies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Error type for completion requests
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from completion service")]
    InvalidResponse,
}

/// Produces a reply for a participant's message
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [PromptMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct PromptMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for chat-completion endpoints
pub struct ChatCompletionClient {
    http_client: Client,
    endpoint: String,
    model: String,
    system_prompt: String,
    api_key: Option<String>,
}

impl ChatCompletionClient {
    /// Build a client. `timeout` of `None` lets slow completions run to the end.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, CompletionError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http_client: builder.build()?,
            endpoint: endpoint.into(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            api_key,
        })
    }

    pub fn from_config(config: &crate::config::Config) -> Result<Self, CompletionError> {
        Self::new(
            config.completion_url.clone(),
            config.completion_model.clone(),
            config.completion_system_prompt.clone(),
            config.completion_api_key.clone(),
            config.completion_timeout_ms.map(Duration::from_millis),
        )
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [
                PromptMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                PromptMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let mut request = self.http_client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|_| CompletionError::InvalidResponse)?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::InvalidResponse)
    }
}
