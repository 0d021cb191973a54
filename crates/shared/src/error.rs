//! Error types for the support chat relay

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl ChatError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ChatError::Validation(_))
    }
}

/// Result type alias for store operations
pub type ChatResult<T> = Result<T, ChatError>;
