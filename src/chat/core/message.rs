//! Sessions and chat messages as persisted and served to clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::core::ids::{MessageId, SessionId};
use crate::chat::core::language::LanguageCode;

/// Greeting seeded into every new message list.
pub const GREETING: &str = "Hi there, how can I help you today?";

/// Name given to a session until the background rename replaces it.
pub const PLACEHOLDER_SESSION_NAME: &str = "New Chat";

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Typed by the user.
    User,
    /// Produced by a capability (or an error report).
    Assistant,
}

/// A named conversation thread.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    pub id: SessionId,
    /// Display name.
    pub name: String,
}

impl Session {
    /// A freshly created session carrying the placeholder name.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            id: SessionId::new(),
            name: PLACEHOLDER_SESSION_NAME.to_string(),
        }
    }

    /// Whether the background rename has not replaced the name yet.
    #[must_use]
    pub fn has_placeholder_name(&self) -> bool {
        self.name == PLACEHOLDER_SESSION_NAME
    }
}

/// One immutable entry of a session's message list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique identifier.
    pub id: MessageId,
    /// Author.
    pub role: Role,
    /// Message body (markdown for assistant replies).
    pub text: String,
    /// Language detected when the user submitted the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<LanguageCode>,
    /// Set when the message reports a failed capability call.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    /// Creation time; absent on records written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl Message {
    fn build(role: Role, text: String) -> Self {
        Self {
            id: MessageId::new(),
            role,
            text,
            detected_language: None,
            is_error: false,
            created_at: Some(Utc::now()),
        }
    }

    /// The synthetic greeting that opens every session.
    #[must_use]
    pub fn greeting() -> Self {
        Self::build(Role::Assistant, GREETING.to_string())
    }

    /// A user message tagged with its detected language.
    #[must_use]
    pub fn user(text: impl Into<String>, language: LanguageCode) -> Self {
        let mut message = Self::build(Role::User, text.into());
        message.detected_language = Some(language);
        message
    }

    /// An assistant reply (generation, summary or translation).
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::build(Role::Assistant, text.into())
    }

    /// An assistant message reporting a failure.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        let mut message = Self::build(Role::Assistant, text.into());
        message.is_error = true;
        message
    }

    /// Number of whitespace-separated words in the body.
    #[must_use]
    pub fn word_count(&self) -> usize {
        word_count(&self.text)
    }
}

/// Count whitespace-separated words.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_is_assistant() {
        let message = Message::greeting();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text, GREETING);
        assert!(!message.is_error);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let mut message = Message::assistant("hello");
        message.created_at = None;
        let json = serde_json::to_value(&message).unwrap_or_default();
        assert_eq!(json["role"], "assistant");
        assert!(json.get("detectedLanguage").is_none());
        assert!(json.get("isError").is_none());
    }

    #[test]
    fn test_reads_minimal_record() {
        let raw = r#"{"id":"6f1c3f1e-8e7c-4a55-9d4b-2f8f0d1f9a11","role":"user","text":"Olá","detectedLanguage":"pt"}"#;
        let message: Result<Message, _> = serde_json::from_str(raw);
        assert!(message.is_ok());
        if let Ok(message) = message {
            assert_eq!(message.role, Role::User);
            assert_eq!(message.detected_language.map(|l| l.to_string()), Some("pt".to_string()));
            assert!(!message.is_error);
            assert!(message.created_at.is_none());
        }
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree\tfour  "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn test_error_message_flag() {
        let message = Message::error("boom");
        assert!(message.is_error);
        assert_eq!(message.role, Role::Assistant);
    }
}
