//! Decides which messages get automatic replies and which can be summarized.

use crate::chat::core::config::PolicyConfig;
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::language::LanguageCode;
use crate::chat::core::message::{Message, word_count};

/// Reply and summarization thresholds.
#[derive(Clone, Debug)]
pub struct ReplyPolicy {
    auto_reply_language: LanguageCode,
    max_auto_reply_words: usize,
    summarize_min_words: usize,
}

impl ReplyPolicy {
    /// Build from configuration.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the reply language is not a valid code.
    pub fn from_config(config: &PolicyConfig) -> ChatResult<Self> {
        let auto_reply_language = config
            .auto_reply_language
            .parse::<LanguageCode>()
            .map_err(|err| ChatError::InvalidConfig(format!("auto_reply_language: {err}")))?;
        Ok(Self {
            auto_reply_language,
            max_auto_reply_words: config.max_auto_reply_words,
            summarize_min_words: config.summarize_min_words,
        })
    }

    /// Whether input in `language` gets a generated reply.
    #[must_use]
    pub fn should_auto_reply(&self, language: &LanguageCode, text: &str) -> bool {
        *language == self.auto_reply_language && word_count(text) <= self.max_auto_reply_words
    }

    /// Whether a message is long enough to be summarized.
    #[must_use]
    pub fn can_summarize(&self, message: &Message) -> bool {
        message.word_count() > self.summarize_min_words
    }
}

impl Default for ReplyPolicy {
    fn default() -> Self {
        Self {
            auto_reply_language: LanguageCode::english(),
            max_auto_reply_words: 150,
            summarize_min_words: 150,
        }
    }
}
