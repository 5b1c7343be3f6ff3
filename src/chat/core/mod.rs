//! Core chat types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod language;
pub mod message;

pub use config::{
    CapabilitiesConfig, ChatConfig, FamilyConfig, OllamaConfig, PolicyConfig, RenameConfig,
    StorageConfig,
};
pub use errors::{ChatError, ChatResult};
pub use ids::{MessageId, SessionId};
pub use language::{LanguageCode, LanguageGuess, LanguagePair, SUPPORTED_LANGUAGES};
pub use message::{GREETING, Message, PLACEHOLDER_SESSION_NAME, Role, Session};
