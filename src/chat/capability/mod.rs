//! Host-provided AI capabilities and the gateways that cache them.
//!
//! A capability family (generation, detection, summarization, translation) is
//! modelled by [`Capability`]: an availability check, a provisioning step, a
//! readiness wait and one domain call. [`CapabilityGateway`] turns any
//! capability into a cached, deduplicated, busy-tracked service.

pub mod errors;
pub mod gateway;
pub mod ollama;
#[cfg(test)]
pub mod scripted;

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;

pub use errors::{CapabilityError, CapabilityResult};
pub use gateway::{CapabilityGateway, Gateway};

use crate::chat::core::language::{LanguageGuess, LanguagePair};

/// Boxed future type for capability operations.
pub type CapabilityFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Capability families offered by the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CapabilityKind {
    /// Conversational text generation.
    Generation,
    /// Language detection.
    LanguageDetection,
    /// Summarization.
    Summarization,
    /// Translation.
    Translation,
}

impl CapabilityKind {
    /// Stable string form for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generation => "language model",
            Self::LanguageDetection => "language detection",
            Self::Summarization => "summarizer",
            Self::Translation => "translator",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing the host for a capability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Availability {
    /// Cannot be provisioned.
    No,
    /// Usable immediately.
    Readily,
    /// Usable once provisioning (e.g. a model download) completes.
    AfterDownload,
}

/// One host capability family.
pub trait Capability: Send + Sync + 'static {
    /// Configuration key; one handle is cached per distinct key.
    type Key: Clone + Eq + Hash + Send + Sync + 'static;
    /// Provisioned handle.
    type Handle: Send + Sync + 'static;
    /// Domain input.
    type Input: Send + 'static;
    /// Domain output.
    type Output: Send + 'static;

    /// Family of this capability.
    fn kind(&self) -> CapabilityKind;

    /// Whether the host offers this family at all.
    fn is_supported(&self) -> bool;

    /// Describe what a key requests, for error messages.
    fn describe(&self, key: &Self::Key) -> String;

    /// Check availability for `key`.
    fn availability<'a>(
        &'a self,
        key: &'a Self::Key,
    ) -> CapabilityFuture<'a, CapabilityResult<Availability>>;

    /// Create a handle for `key`.
    fn provision<'a>(
        &'a self,
        key: &'a Self::Key,
    ) -> CapabilityFuture<'a, CapabilityResult<Self::Handle>>;

    /// Wait until a freshly provisioned handle is ready.
    fn wait_ready<'a>(
        &'a self,
        handle: &'a Self::Handle,
    ) -> CapabilityFuture<'a, CapabilityResult<()>>;

    /// Run the domain operation.
    fn call<'a>(
        &'a self,
        handle: &'a Self::Handle,
        input: Self::Input,
    ) -> CapabilityFuture<'a, CapabilityResult<Self::Output>>;
}

/// Generation gateway: prompt in, reply out.
pub type GenerationGateway = Arc<dyn Gateway<(), String, String>>;
/// Detection gateway: text in, ranked guesses out.
pub type DetectionGateway = Arc<dyn Gateway<(), String, Vec<LanguageGuess>>>;
/// Summarization gateway: text in, summary out.
pub type SummarizationGateway = Arc<dyn Gateway<(), String, String>>;
/// Translation gateway keyed by language pair.
pub type TranslationGateway = Arc<dyn Gateway<LanguagePair, String, String>>;

/// What the capability layer is currently busy with.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    /// Language detection in flight.
    Detecting,
    /// Summarization in flight.
    Summarizing,
    /// Translation in flight.
    Translating,
    /// Generation in flight.
    Thinking,
}

/// The four gateways used by the orchestrator.
#[derive(Clone)]
pub struct CapabilityGateways {
    /// Conversational replies and session titles.
    pub generation: GenerationGateway,
    /// Language detection for user input.
    pub detection: DetectionGateway,
    /// Summaries of long messages.
    pub summarization: SummarizationGateway,
    /// Per-pair translators.
    pub translation: TranslationGateway,
}

impl CapabilityGateways {
    /// Current busy activity, most specific first.
    #[must_use]
    pub fn activity(&self) -> Option<Activity> {
        if self.detection.is_busy() {
            Some(Activity::Detecting)
        } else if self.summarization.is_busy() {
            Some(Activity::Summarizing)
        } else if self.translation.is_busy() {
            Some(Activity::Translating)
        } else if self.generation.is_busy() {
            Some(Activity::Thinking)
        } else {
            None
        }
    }
}
