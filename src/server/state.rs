//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::capability::CapabilityGateways;
use crate::chat::core::config::ChatConfig;
use crate::chat::core::errors::ChatResult;
use crate::chat::engine::ChatOrchestrator;
use crate::chat::storage::{SessionStore, SqliteKvStore};

/// Shared application state.
pub struct AppState {
    /// Conversation orchestrator.
    pub chat: Arc<ChatOrchestrator>,
}

impl AppState {
    /// Wrap an already opened orchestrator.
    #[must_use]
    pub fn new(chat: Arc<ChatOrchestrator>) -> Arc<Self> {
        Arc::new(Self { chat })
    }

    /// Open `SQLite` storage, build the Ollama gateways and load the chat state.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the database cannot
    /// be opened, or the Ollama client cannot be built.
    pub async fn from_config(config: &ChatConfig) -> ChatResult<Arc<Self>> {
        config.validate()?;
        let kv = SqliteKvStore::open(&config.storage).await?;
        let store = SessionStore::new(Arc::new(kv), config.storage.key_prefix.clone());
        let gateways = CapabilityGateways::ollama(&config.ollama, &config.capabilities)?;
        let chat = ChatOrchestrator::open(config, store, gateways).await?;
        Ok(Self::new(chat))
    }
}
