//! Language codes, detection guesses and translation pairs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Languages offered as translation targets, with display names.
pub const SUPPORTED_LANGUAGES: [(&str, &str); 6] = [
    ("en", "English"),
    ("pt", "Portuguese"),
    ("es", "Spanish"),
    ("ru", "Russian"),
    ("tr", "Turkish"),
    ("fr", "French"),
];

/// Maximum accepted length of a language tag (e.g. `zh-Hant`).
const MAX_CODE_LEN: usize = 16;

/// Errors returned when parsing a [`LanguageCode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageCodeError {
    /// Empty (or whitespace-only) code.
    Empty,
    /// Longer than a plausible BCP 47 tag.
    TooLong(usize),
    /// Contains a character outside `[A-Za-z0-9_-]`.
    InvalidChar(char),
}

impl fmt::Display for LanguageCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "language code must not be empty"),
            Self::TooLong(len) => write!(f, "language code too long: {len} chars"),
            Self::InvalidChar(ch) => write!(f, "language code contains invalid character {ch:?}"),
        }
    }
}

impl std::error::Error for LanguageCodeError {}

/// Lowercased primary language subtag such as `en` or `pt`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageCode(String);

impl LanguageCode {
    /// English, the only language that gets automatic replies by default.
    #[must_use]
    pub fn english() -> Self {
        Self("en".to_string())
    }

    /// Borrow the code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display name for supported languages.
    #[must_use]
    pub fn display_name(&self) -> Option<&'static str> {
        SUPPORTED_LANGUAGES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }

    /// Whether this code is one of [`SUPPORTED_LANGUAGES`].
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.display_name().is_some()
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LanguageCode {
    type Err = LanguageCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LanguageCodeError::Empty);
        }
        if trimmed.len() > MAX_CODE_LEN {
            return Err(LanguageCodeError::TooLong(trimmed.len()));
        }
        if let Some(ch) = trimmed
            .chars()
            .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_')))
        {
            return Err(LanguageCodeError::InvalidChar(ch));
        }
        // Region and script subtags are dropped: `en-US` and `en_GB` are `en`.
        let primary = trimmed.split(['-', '_']).next().unwrap_or_default();
        if primary.is_empty() {
            return Err(LanguageCodeError::Empty);
        }
        Ok(Self(primary.to_ascii_lowercase()))
    }
}

/// One ranked guess returned by a language detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageGuess {
    /// Detected language.
    pub language: LanguageCode,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Pick the highest-confidence guess.
#[must_use]
pub fn best_guess(guesses: &[LanguageGuess]) -> Option<&LanguageGuess> {
    guesses
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// Ordered (source, target) pair keying a translator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LanguagePair {
    /// Language of the input text.
    pub source: LanguageCode,
    /// Language to translate into.
    pub target: LanguageCode,
}

impl LanguagePair {
    /// Build a pair.
    #[must_use]
    pub const fn new(source: LanguageCode, target: LanguageCode) -> Self {
        Self { source, target }
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> LanguageCode {
        s.parse().unwrap_or_else(|_| LanguageCode::english())
    }

    #[test]
    fn test_parse_normalizes_case() {
        assert_eq!(code(" PT ").as_str(), "pt");
        assert_eq!("".parse::<LanguageCode>(), Err(LanguageCodeError::Empty));
        assert_eq!(
            "e n".parse::<LanguageCode>(),
            Err(LanguageCodeError::InvalidChar(' '))
        );
    }

    #[test]
    fn test_parse_keeps_primary_subtag() {
        assert_eq!("en-US".parse::<LanguageCode>(), Ok(LanguageCode::english()));
        let brazilian = "pt_BR".parse::<LanguageCode>();
        assert_eq!(brazilian.as_ref().map(LanguageCode::is_supported), Ok(true));
        assert_eq!(code("zh-Hant").as_str(), "zh");
        assert_eq!("-US".parse::<LanguageCode>(), Err(LanguageCodeError::Empty));
    }

    #[test]
    fn test_supported_languages() {
        assert_eq!(code("fr").display_name(), Some("French"));
        assert!(!code("de").is_supported());
    }

    #[test]
    fn test_best_guess_picks_highest_confidence() {
        let guesses = vec![
            LanguageGuess { language: code("es"), confidence: 0.2 },
            LanguageGuess { language: code("pt"), confidence: 0.7 },
            LanguageGuess { language: code("en"), confidence: 0.1 },
        ];
        assert_eq!(best_guess(&guesses).map(|g| g.language.as_str()), Some("pt"));
        assert!(best_guess(&[]).is_none());
    }

    #[test]
    fn test_pair_display() {
        let pair = LanguagePair::new(code("en"), code("fr"));
        assert_eq!(pair.to_string(), "en/fr");
    }
}
