//! Capability families backed by an Ollama server.
//!
//! Model presence stands in for host availability:
//! - installed model: [`Availability::Readily`]
//! - missing model with `auto_pull`: [`Availability::AfterDownload`] (provisioning pulls it)
//! - missing model without `auto_pull`: [`Availability::No`]
//!
//! Each family is a prompt adapter over a Rig completion model.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chat::capability::gateway::CapabilityGateway;
use crate::chat::capability::{
    Availability, Capability, CapabilityError, CapabilityFuture, CapabilityGateways,
    CapabilityKind, CapabilityResult,
};
use crate::chat::core::config::{CapabilitiesConfig, FamilyConfig, OllamaConfig};
use crate::chat::core::language::{LanguageCode, LanguageGuess, LanguagePair};

/// Instruction for the language detector.
const DETECTION_INSTRUCTION: &str = r#"You identify the language of the user's text.
Respond with ONLY a JSON array of your best guesses, most likely first, for example:
[{"language": "en", "confidence": 0.92}, {"language": "fr", "confidence": 0.05}]
Use ISO 639-1 codes. Confidence values are between 0 and 1. Do not add any other text."#;

/// Instruction for the summarizer: short, plain text, TL;DR style.
const SUMMARY_INSTRUCTION: &str = "You write a TL;DR of the user's text. \
Keep it short: one to three sentences. \
Use plain text only, no markdown, no headings, no bullet points. \
Reply with the summary and nothing else.";

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullResponse {
    status: String,
}

#[derive(Deserialize)]
struct RawGuess {
    language: String,
    confidence: f64,
}

/// Provisioned Ollama model with the instruction of its family.
pub struct OllamaHandle {
    model_name: String,
    model: ollama::CompletionModel<ReqwestClient>,
    preamble: String,
    temperature: f64,
}

impl OllamaHandle {
    /// Name of the backing model.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Shared Ollama connection: model management over HTTP, completions via Rig.
pub struct OllamaBackend {
    http: ReqwestClient,
    /// Downloads can take minutes: no request timeout, readiness is bounded instead.
    pull_http: ReqwestClient,
    client: ollama::Client<ReqwestClient>,
    config: OllamaConfig,
}

impl OllamaBackend {
    /// Create a backend for `config.base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(config: &OllamaConfig) -> CapabilityResult<Self> {
        let http = ReqwestClient::builder()
            .timeout(config.request_timeout())
            .build()?;
        let pull_http = ReqwestClient::builder().build()?;
        let client = ollama::Client::<ReqwestClient>::builder()
            .api_key(rig::client::Nothing)
            .base_url(&config.base_url)
            .build()?;

        Ok(Self {
            http,
            pull_http,
            client,
            config: config.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn installed_models(&self) -> CapabilityResult<Vec<String>> {
        let tags: TagsResponse = self
            .http
            .get(self.endpoint("/api/tags"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(tags.models.into_iter().map(|entry| entry.name).collect())
    }

    async fn is_installed(&self, model: &str) -> CapabilityResult<bool> {
        let installed = self.installed_models().await?;
        Ok(installed.iter().any(|name| model_matches(name, model)))
    }

    async fn model_availability(&self, model: &str) -> CapabilityResult<Availability> {
        if self.is_installed(model).await? {
            Ok(Availability::Readily)
        } else if self.config.auto_pull {
            Ok(Availability::AfterDownload)
        } else {
            Ok(Availability::No)
        }
    }

    async fn pull(&self, kind: CapabilityKind, model: &str) -> CapabilityResult<()> {
        info!(%kind, model, "Pulling model");
        let response: PullResponse = self
            .pull_http
            .post(self.endpoint("/api/pull"))
            .json(&PullRequest {
                model,
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status == "success" {
            Ok(())
        } else {
            Err(CapabilityError::Provisioning {
                kind,
                message: format!("pull of {model} ended with status {:?}", response.status),
            })
        }
    }

    async fn wait_listed(&self, kind: CapabilityKind, model: &str) -> CapabilityResult<()> {
        let deadline = Instant::now() + self.config.ready_timeout();
        loop {
            if self.is_installed(model).await? {
                debug!(%kind, model, "Model ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CapabilityError::Provisioning {
                    kind,
                    message: format!("model {model} not ready after download"),
                });
            }
            tokio::time::sleep(self.config.ready_poll()).await;
        }
    }

    fn handle(&self, family: &FamilyConfig, preamble: String) -> OllamaHandle {
        OllamaHandle {
            model_name: family.model.clone(),
            model: self.client.completion_model(family.model.clone()),
            preamble,
            temperature: family.temperature,
        }
    }

    async fn complete(&self, handle: &OllamaHandle, prompt: String) -> CapabilityResult<String> {
        let request = handle
            .model
            .completion_request(prompt)
            .preamble(handle.preamble.clone())
            .temperature(handle.temperature)
            .build();

        let response = handle.model.completion(request).await?;
        Ok(extract_text(&response.choice).trim().to_string())
    }
}

/// Ollama lists `name:tag`; a bare model name means `:latest`.
fn model_matches(listed: &str, wanted: &str) -> bool {
    listed == wanted || (!wanted.contains(':') && listed == format!("{wanted}:latest"))
}

/// Extract text from assistant response.
fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}

/// Parse the detector's JSON answer into guesses ranked by confidence.
fn parse_guesses(raw: &str) -> CapabilityResult<Vec<LanguageGuess>> {
    let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) else {
        return Err(CapabilityError::MalformedResponse(format!(
            "expected a JSON array of guesses, got {raw:?}"
        )));
    };
    if end < start {
        return Err(CapabilityError::MalformedResponse(format!(
            "expected a JSON array of guesses, got {raw:?}"
        )));
    }

    let parsed: Vec<RawGuess> = serde_json::from_str(&raw[start..=end])
        .map_err(|err| CapabilityError::MalformedResponse(err.to_string()))?;

    let mut guesses: Vec<LanguageGuess> = parsed
        .into_iter()
        .filter_map(|guess| {
            let language: LanguageCode = guess.language.parse().ok()?;
            Some(LanguageGuess {
                language,
                confidence: guess.confidence.clamp(0.0, 1.0),
            })
        })
        .collect();
    guesses.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    if guesses.is_empty() {
        return Err(CapabilityError::NoLanguageDetected);
    }
    Ok(guesses)
}

fn translation_instruction(pair: &LanguagePair) -> String {
    let source = pair.source.display_name().unwrap_or(pair.source.as_str());
    let target = pair.target.display_name().unwrap_or(pair.target.as_str());
    format!(
        "You translate the user's text from {source} to {target}. \
Preserve meaning, tone and formatting. Reply with the translation only."
    )
}

/// Family settings plus the shared backend.
struct Family {
    backend: Arc<OllamaBackend>,
    config: FamilyConfig,
    kind: CapabilityKind,
}

impl Family {
    fn availability(&self) -> CapabilityFuture<'_, CapabilityResult<Availability>> {
        Box::pin(self.backend.model_availability(&self.config.model))
    }

    fn provision(&self, preamble: String) -> CapabilityFuture<'_, CapabilityResult<OllamaHandle>> {
        Box::pin(async move {
            if !self.backend.is_installed(&self.config.model).await? {
                self.backend.pull(self.kind, &self.config.model).await?;
            }
            Ok(self.backend.handle(&self.config, preamble))
        })
    }

    fn wait_ready<'a>(
        &'a self,
        handle: &'a OllamaHandle,
    ) -> CapabilityFuture<'a, CapabilityResult<()>> {
        Box::pin(self.backend.wait_listed(self.kind, handle.model_name()))
    }
}

/// Conversational generation with a fixed system instruction.
pub struct OllamaGenerator {
    family: Family,
    instruction: String,
}

impl Capability for OllamaGenerator {
    type Key = ();
    type Handle = OllamaHandle;
    type Input = String;
    type Output = String;

    fn kind(&self) -> CapabilityKind {
        self.family.kind
    }

    fn is_supported(&self) -> bool {
        self.family.config.enabled
    }

    fn describe(&self, _key: &()) -> String {
        format!("language model {}", self.family.config.model)
    }

    fn availability<'a>(
        &'a self,
        _key: &'a (),
    ) -> CapabilityFuture<'a, CapabilityResult<Availability>> {
        self.family.availability()
    }

    fn provision<'a>(
        &'a self,
        _key: &'a (),
    ) -> CapabilityFuture<'a, CapabilityResult<OllamaHandle>> {
        self.family.provision(self.instruction.clone())
    }

    fn wait_ready<'a>(
        &'a self,
        handle: &'a OllamaHandle,
    ) -> CapabilityFuture<'a, CapabilityResult<()>> {
        self.family.wait_ready(handle)
    }

    fn call<'a>(
        &'a self,
        handle: &'a OllamaHandle,
        prompt: String,
    ) -> CapabilityFuture<'a, CapabilityResult<String>> {
        Box::pin(self.family.backend.complete(handle, prompt))
    }
}

/// Language detection returning ranked guesses.
pub struct OllamaDetector {
    family: Family,
}

impl Capability for OllamaDetector {
    type Key = ();
    type Handle = OllamaHandle;
    type Input = String;
    type Output = Vec<LanguageGuess>;

    fn kind(&self) -> CapabilityKind {
        self.family.kind
    }

    fn is_supported(&self) -> bool {
        self.family.config.enabled
    }

    fn describe(&self, _key: &()) -> String {
        format!("language detector {}", self.family.config.model)
    }

    fn availability<'a>(
        &'a self,
        _key: &'a (),
    ) -> CapabilityFuture<'a, CapabilityResult<Availability>> {
        self.family.availability()
    }

    fn provision<'a>(
        &'a self,
        _key: &'a (),
    ) -> CapabilityFuture<'a, CapabilityResult<OllamaHandle>> {
        self.family.provision(DETECTION_INSTRUCTION.to_string())
    }

    fn wait_ready<'a>(
        &'a self,
        handle: &'a OllamaHandle,
    ) -> CapabilityFuture<'a, CapabilityResult<()>> {
        self.family.wait_ready(handle)
    }

    fn call<'a>(
        &'a self,
        handle: &'a OllamaHandle,
        text: String,
    ) -> CapabilityFuture<'a, CapabilityResult<Vec<LanguageGuess>>> {
        Box::pin(async move {
            let raw = self.family.backend.complete(handle, text).await?;
            parse_guesses(&raw)
        })
    }
}

/// Short plain-text TL;DR summaries.
pub struct OllamaSummarizer {
    family: Family,
}

impl Capability for OllamaSummarizer {
    type Key = ();
    type Handle = OllamaHandle;
    type Input = String;
    type Output = String;

    fn kind(&self) -> CapabilityKind {
        self.family.kind
    }

    fn is_supported(&self) -> bool {
        self.family.config.enabled
    }

    fn describe(&self, _key: &()) -> String {
        format!("summarizer {}", self.family.config.model)
    }

    fn availability<'a>(
        &'a self,
        _key: &'a (),
    ) -> CapabilityFuture<'a, CapabilityResult<Availability>> {
        self.family.availability()
    }

    fn provision<'a>(
        &'a self,
        _key: &'a (),
    ) -> CapabilityFuture<'a, CapabilityResult<OllamaHandle>> {
        self.family.provision(SUMMARY_INSTRUCTION.to_string())
    }

    fn wait_ready<'a>(
        &'a self,
        handle: &'a OllamaHandle,
    ) -> CapabilityFuture<'a, CapabilityResult<()>> {
        self.family.wait_ready(handle)
    }

    fn call<'a>(
        &'a self,
        handle: &'a OllamaHandle,
        text: String,
    ) -> CapabilityFuture<'a, CapabilityResult<String>> {
        Box::pin(self.family.backend.complete(handle, text))
    }
}

/// Translation keyed by language pair.
pub struct OllamaTranslator {
    family: Family,
    languages: Vec<LanguageCode>,
}

impl OllamaTranslator {
    fn accepts(&self, pair: &LanguagePair) -> bool {
        pair.source != pair.target
            && self.languages.contains(&pair.source)
            && self.languages.contains(&pair.target)
    }
}

impl Capability for OllamaTranslator {
    type Key = LanguagePair;
    type Handle = OllamaHandle;
    type Input = String;
    type Output = String;

    fn kind(&self) -> CapabilityKind {
        self.family.kind
    }

    fn is_supported(&self) -> bool {
        self.family.config.enabled
    }

    fn describe(&self, pair: &LanguagePair) -> String {
        format!("translator for {pair} language pair")
    }

    fn availability<'a>(
        &'a self,
        pair: &'a LanguagePair,
    ) -> CapabilityFuture<'a, CapabilityResult<Availability>> {
        if !self.accepts(pair) {
            return Box::pin(async { Ok::<_, CapabilityError>(Availability::No) });
        }
        self.family.availability()
    }

    fn provision<'a>(
        &'a self,
        pair: &'a LanguagePair,
    ) -> CapabilityFuture<'a, CapabilityResult<OllamaHandle>> {
        self.family.provision(translation_instruction(pair))
    }

    fn wait_ready<'a>(
        &'a self,
        handle: &'a OllamaHandle,
    ) -> CapabilityFuture<'a, CapabilityResult<()>> {
        self.family.wait_ready(handle)
    }

    fn call<'a>(
        &'a self,
        handle: &'a OllamaHandle,
        text: String,
    ) -> CapabilityFuture<'a, CapabilityResult<String>> {
        Box::pin(self.family.backend.complete(handle, text))
    }
}

impl CapabilityGateways {
    /// Build the four gateways over one Ollama backend.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be created.
    pub fn ollama(
        ollama_config: &OllamaConfig,
        config: &CapabilitiesConfig,
    ) -> CapabilityResult<Self> {
        let backend = Arc::new(OllamaBackend::new(ollama_config)?);
        let family = |config: &FamilyConfig, kind| Family {
            backend: Arc::clone(&backend),
            config: config.clone(),
            kind,
        };

        let languages = config
            .translation_languages
            .iter()
            .filter_map(|code| code.parse().ok())
            .collect();

        Ok(Self {
            generation: Arc::new(CapabilityGateway::new(OllamaGenerator {
                family: family(&config.generation, CapabilityKind::Generation),
                instruction: config.system_instruction.clone(),
            })),
            detection: Arc::new(CapabilityGateway::new(OllamaDetector {
                family: family(&config.detection, CapabilityKind::LanguageDetection),
            })),
            summarization: Arc::new(CapabilityGateway::new(OllamaSummarizer {
                family: family(&config.summarization, CapabilityKind::Summarization),
            })),
            translation: Arc::new(CapabilityGateway::new(OllamaTranslator {
                family: family(&config.translation, CapabilityKind::Translation),
                languages,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_guesses_ranks_by_confidence() {
        let raw = r#"Sure! [{"language": "es", "confidence": 0.1},
            {"language": "PT-br", "confidence": 0.85}]"#;
        let guesses = parse_guesses(raw).unwrap_or_default();
        assert_eq!(guesses.len(), 2);
        assert_eq!(guesses[0].language.as_str(), "pt");
    }

    #[test]
    fn test_parse_guesses_rejects_prose() {
        assert!(matches!(
            parse_guesses("It is English."),
            Err(CapabilityError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_guesses("[]"),
            Err(CapabilityError::NoLanguageDetected)
        ));
    }

    #[test]
    fn test_model_matches_latest_tag() {
        assert!(model_matches("llama3.2:latest", "llama3.2"));
        assert!(model_matches("llama3.2:1b", "llama3.2:1b"));
        assert!(!model_matches("llama3.2:1b", "llama3.2"));
    }

    #[test]
    fn test_translation_instruction_names_languages() {
        let pair = LanguagePair::new(
            "en".parse().unwrap_or_else(|_| LanguageCode::english()),
            "fr".parse().unwrap_or_else(|_| LanguageCode::english()),
        );
        let instruction = translation_instruction(&pair);
        assert!(instruction.contains("from English to French"));
    }

    #[test]
    fn test_translator_accepts_listed_distinct_pairs() {
        let backend = OllamaBackend::new(&OllamaConfig::default());
        assert!(backend.is_ok());
        let Ok(backend) = backend else { return };
        let code = |s: &str| s.parse().unwrap_or_else(|_| LanguageCode::english());
        let translator = OllamaTranslator {
            family: Family {
                backend: Arc::new(backend),
                config: CapabilitiesConfig::default().translation,
                kind: CapabilityKind::Translation,
            },
            languages: vec![code("en"), code("fr")],
        };

        assert!(translator.accepts(&LanguagePair::new(code("en"), code("fr"))));
        assert!(!translator.accepts(&LanguagePair::new(code("fr"), code("fr"))));
        assert!(!translator.accepts(&LanguagePair::new(code("en"), code("ja"))));
    }

    #[test]
    fn test_gateways_build_offline() {
        let gateways =
            CapabilityGateways::ollama(&OllamaConfig::default(), &CapabilitiesConfig::default());
        assert!(gateways.is_ok());
        if let Ok(gateways) = gateways {
            assert!(gateways.activity().is_none());
        }
    }
}
