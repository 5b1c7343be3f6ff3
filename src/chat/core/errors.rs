//! Error types for the chat service.

use thiserror::Error;

use crate::chat::capability::CapabilityError;
use crate::chat::core::ids::{MessageId, SessionId};

/// Chat service error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A transition needs an active session.
    #[error("no active session")]
    NoActiveSession,
    /// Submit was called without pending text.
    #[error("message is empty")]
    EmptyInput,
    /// Unknown session id.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),
    /// Unknown message id in the active session.
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),
    /// The message is too short to be summarized.
    #[error("message {0} is too short to summarize")]
    NotSummarizable(MessageId),
    /// Only user messages with a detected language can be translated.
    #[error("message {0} cannot be translated")]
    NotTranslatable(MessageId),
    /// The requested language is not offered.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    /// Capability failure outside of a transition (e.g. backend construction).
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl ChatError {
    /// Whether the error is caused by the request rather than the service.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoActiveSession
                | Self::EmptyInput
                | Self::NotSummarizable(_)
                | Self::NotTranslatable(_)
                | Self::UnsupportedLanguage(_)
        )
    }

    /// Whether the error names a missing resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound(_) | Self::MessageNotFound(_))
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;
