//! Application configuration

use std::env;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a customer service assistant and you have to help user with any query they have.";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database (unset: in-memory store)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Auto-reply
    pub auto_reply_enabled: bool,
    pub completion_url: String,
    pub completion_model: String,
    pub completion_api_key: Option<String>,
    pub completion_system_prompt: String,
    pub completion_timeout_ms: Option<u64>,

    // Logging
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Auto-reply
            auto_reply_enabled: env::var("AUTO_REPLY_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            completion_url: {
                let url = env::var("COMPLETION_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/v1/chat/completions".to_string());
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::Invalid(
                        "COMPLETION_URL must be an http(s) URL",
                    ));
                }
                url
            },
            completion_model: env::var("COMPLETION_MODEL")
                .unwrap_or_else(|_| "gemma-3-270m-it".to_string()),
            completion_api_key: env::var("COMPLETION_API_KEY").ok().filter(|v| !v.is_empty()),
            completion_system_prompt: env::var("COMPLETION_SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            completion_timeout_ms: env::var("COMPLETION_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),

            // Logging
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}
