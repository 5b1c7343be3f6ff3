//! Error types for capability acquisition and calls.

use thiserror::Error;

use crate::chat::capability::CapabilityKind;

/// Failure while acquiring or calling a capability.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The host offers no such capability at all.
    #[error("{kind} not supported")]
    Unsupported {
        /// Capability family.
        kind: CapabilityKind,
    },
    /// The host reports the capability cannot be provisioned.
    #[error("{scope} is not usable")]
    Unavailable {
        /// Capability family.
        kind: CapabilityKind,
        /// Human readable description of what was requested.
        scope: String,
    },
    /// Provisioning (download or warm-up) failed.
    #[error("failed to provision {kind}: {message}")]
    Provisioning {
        /// Capability family.
        kind: CapabilityKind,
        /// Failure detail.
        message: String,
    },
    /// The domain call itself failed.
    #[error("{kind} request failed: {message}")]
    Call {
        /// Capability family.
        kind: CapabilityKind,
        /// Failure detail.
        message: String,
    },
    /// The detector returned no guesses.
    #[error("could not detect the language of the message")]
    NoLanguageDetected,
    /// The backend answered with something that could not be interpreted.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Completion error from Rig.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
}

/// Convenience result alias for capability operations.
pub type CapabilityResult<T> = Result<T, CapabilityError>;
