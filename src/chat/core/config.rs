//! Configuration for the chat service.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::language::{LanguageCode, SUPPORTED_LANGUAGES};

/// Environment variable overriding the Ollama base URL.
pub const OLLAMA_URL_ENV: &str = "CINTABOT_OLLAMA_URL";
/// Environment variable overriding the model used by every capability.
pub const MODEL_ENV: &str = "CINTABOT_MODEL";
/// Environment variable overriding the `SQLite` database path.
pub const DB_PATH_ENV: &str = "CINTABOT_DB_PATH";
/// Environment variable toggling automatic model pulls (`0`/`false` disables).
pub const AUTO_PULL_ENV: &str = "CINTABOT_AUTO_PULL";

/// Default model for all capability families.
const DEFAULT_MODEL: &str = "llama3.2";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Persistence settings.
    pub storage: StorageConfig,
    /// Ollama backend settings.
    pub ollama: OllamaConfig,
    /// Per-family capability settings.
    pub capabilities: CapabilitiesConfig,
    /// Auto-reply and summarization thresholds.
    pub policy: PolicyConfig,
    /// Background session renaming.
    pub rename: RenameConfig,
}

impl ChatConfig {
    /// Defaults overridden by `CINTABOT_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(OLLAMA_URL_ENV) {
            config.ollama.base_url = url;
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.capabilities.set_model(&model);
        }
        if let Ok(path) = std::env::var(DB_PATH_ENV) {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Ok(flag) = std::env::var(AUTO_PULL_ENV) {
            config.ollama.auto_pull = !matches!(flag.trim(), "0" | "false" | "no");
        }

        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ChatResult<()> {
        Url::parse(&self.ollama.base_url)?;

        if !is_sql_identifier(&self.storage.table) {
            return Err(ChatError::InvalidConfig(format!(
                "storage.table {:?} is not a valid table name",
                self.storage.table
            )));
        }

        if self.storage.key_prefix.trim().is_empty() {
            return Err(ChatError::InvalidConfig(
                "storage.key_prefix must not be empty".to_string(),
            ));
        }

        for (name, family) in self.capabilities.families() {
            if family.model.trim().is_empty() {
                return Err(ChatError::InvalidConfig(format!(
                    "capabilities.{name}.model must not be empty"
                )));
            }
        }

        if self.capabilities.translation_languages.is_empty() {
            return Err(ChatError::InvalidConfig(
                "capabilities.translation_languages must not be empty".to_string(),
            ));
        }
        for code in &self.capabilities.translation_languages {
            parse_language(code)?;
        }
        parse_language(&self.policy.auto_reply_language)?;

        if self.rename.max_attempts == 0 {
            return Err(ChatError::InvalidConfig(
                "rename.max_attempts must be > 0".to_string(),
            ));
        }

        if self.rename.initial_delay_ms == 0 {
            return Err(ChatError::InvalidConfig(
                "rename.initial_delay_ms must be > 0".to_string(),
            ));
        }

        if self.rename.max_delay_ms < self.rename.initial_delay_ms {
            return Err(ChatError::InvalidConfig(
                "rename.max_delay_ms must be >= rename.initial_delay_ms".to_string(),
            ));
        }

        if self.rename.backoff_factor == 0 {
            return Err(ChatError::InvalidConfig(
                "rename.backoff_factor must be > 0".to_string(),
            ));
        }

        if self.rename.title_words == 0 {
            return Err(ChatError::InvalidConfig(
                "rename.title_words must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_language(code: &str) -> ChatResult<LanguageCode> {
    code.parse()
        .map_err(|err| ChatError::InvalidConfig(format!("invalid language code {code:?}: {err}")))
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Key-value table name.
    pub table: String,
    /// Prefix of every record key.
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("cintabot.sqlite"),
            table: "kv_records".to_string(),
            key_prefix: "cintabot".to_string(),
        }
    }
}

/// Ollama backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL of the Ollama API.
    pub base_url: String,
    /// Pull missing models instead of reporting them unavailable.
    pub auto_pull: bool,
    /// Timeout for model management requests (tags, pull).
    pub request_timeout_seconds: u64,
    /// How long to wait for a pulled model to show up.
    pub ready_timeout_seconds: u64,
    /// Poll interval while waiting for a pulled model.
    pub ready_poll_millis: u64,
}

impl OllamaConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Readiness timeout as a [`Duration`].
    #[must_use]
    pub const fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_seconds)
    }

    /// Readiness poll interval as a [`Duration`].
    #[must_use]
    pub const fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_millis)
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            auto_pull: true,
            request_timeout_seconds: 30,
            ready_timeout_seconds: 120,
            ready_poll_millis: 500,
        }
    }
}

/// Settings shared by every capability family.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FamilyConfig {
    /// Whether the family is offered at all.
    pub enabled: bool,
    /// Ollama model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
}

impl FamilyConfig {
    fn with_temperature(temperature: f64) -> Self {
        Self {
            enabled: true,
            model: DEFAULT_MODEL.to_string(),
            temperature,
        }
    }
}

/// Per-family capability settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Conversational generation.
    pub generation: FamilyConfig,
    /// System instruction of the assistant.
    pub system_instruction: String,
    /// Language detection.
    pub detection: FamilyConfig,
    /// Summarization.
    pub summarization: FamilyConfig,
    /// Translation.
    pub translation: FamilyConfig,
    /// Languages the translator accepts on either side of a pair.
    pub translation_languages: Vec<String>,
}

impl CapabilitiesConfig {
    /// Use the same model for every family.
    pub fn set_model(&mut self, model: &str) {
        for family in [
            &mut self.generation,
            &mut self.detection,
            &mut self.summarization,
            &mut self.translation,
        ] {
            family.model = model.to_string();
        }
    }

    fn families(&self) -> [(&'static str, &FamilyConfig); 4] {
        [
            ("generation", &self.generation),
            ("detection", &self.detection),
            ("summarization", &self.summarization),
            ("translation", &self.translation),
        ]
    }
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            generation: FamilyConfig::with_temperature(0.7),
            system_instruction: "You are a helpful conversational assistant".to_string(),
            detection: FamilyConfig::with_temperature(0.0),
            summarization: FamilyConfig::with_temperature(0.3),
            translation: FamilyConfig::with_temperature(0.1),
            translation_languages: SUPPORTED_LANGUAGES
                .iter()
                .map(|(code, _)| (*code).to_string())
                .collect(),
        }
    }
}

/// Auto-reply and summarization thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Only input detected in this language gets an automatic reply.
    pub auto_reply_language: String,
    /// Longest input (in words) that still gets an automatic reply.
    pub max_auto_reply_words: usize,
    /// Messages must exceed this many words to be summarized.
    pub summarize_min_words: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_reply_language: "en".to_string(),
            max_auto_reply_words: 150,
            summarize_min_words: 150,
        }
    }
}

/// Background session renaming.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenameConfig {
    /// Delay before the first check.
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after every unsuccessful check.
    pub backoff_factor: u32,
    /// Ceiling for the delay between checks.
    pub max_delay_ms: u64,
    /// Checks before giving up.
    pub max_attempts: u32,
    /// Requested title length in words.
    pub title_words: usize,
    /// Longest title kept, in characters.
    pub max_title_chars: usize,
}

impl RenameConfig {
    /// Delay before the given (1-based) attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_factor.max(1));
        let mut delay = self.initial_delay_ms;
        for _ in 1..attempt {
            delay = delay.saturating_mul(factor);
            if delay >= self.max_delay_ms {
                delay = self.max_delay_ms;
                break;
            }
        }
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RenameConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            backoff_factor: 2,
            max_delay_ms: 60_000,
            max_attempts: 12,
            title_words: 10,
            max_title_chars: 80,
        }
    }
}
