//! HTTP route handlers for the chat API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::chat::core::errors::ChatError;
use crate::chat::core::ids::{MessageId, SessionId};
use crate::chat::core::language::SUPPORTED_LANGUAGES;
use crate::chat::core::message::Session;
use crate::chat::engine::{ChatSnapshot, TurnOutcome};

use super::state::AppState;

/// Error body returned by handlers.
type ApiError = (StatusCode, String);

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/state", get(chat_state))
        .route("/api/languages", get(languages))
        .route("/api/sessions", post(new_session))
        .route("/api/sessions/{id}", axum::routing::delete(delete_session))
        .route("/api/sessions/{id}/active", put(switch_session))
        .route("/api/draft", put(set_draft))
        .route("/api/messages", post(submit_message))
        .route("/api/messages/{id}/summarize", post(summarize_message))
        .route(
            "/api/messages/{id}/translation-target",
            put(set_translation_target),
        )
        .route("/api/messages/{id}/translate", post(translate_message))
        .with_state(state)
}

fn chat_error(err: ChatError) -> ApiError {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!(?err, "Request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, err.to_string())
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "cintabot",
        "version": env!("CARGO_PKG_VERSION"),
        "activity": state.chat.activity(),
    }))
}

async fn chat_state(State(state): State<Arc<AppState>>) -> Json<ChatSnapshot> {
    Json(state.chat.snapshot().await)
}

/// Language offered as a translation target.
#[derive(Debug, Serialize)]
pub struct LanguageDto {
    /// Language code.
    pub code: &'static str,
    /// English display name.
    pub name: &'static str,
}

async fn languages() -> Json<Vec<LanguageDto>> {
    Json(
        SUPPORTED_LANGUAGES
            .iter()
            .map(|&(code, name)| LanguageDto { code, name })
            .collect(),
    )
}

async fn new_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state.chat.new_chat().await.map_err(chat_error)?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn switch_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<Json<ChatSnapshot>, ApiError> {
    state.chat.switch_session(id).await.map_err(chat_error)?;
    Ok(Json(state.chat.snapshot().await))
}

async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<SessionId>,
) -> Result<StatusCode, ApiError> {
    state.chat.delete_session(id).await.map_err(chat_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Draft update request.
#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    /// New pending text.
    pub text: String,
}

async fn set_draft(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DraftRequest>,
) -> StatusCode {
    state.chat.set_pending(request.text).await;
    StatusCode::NO_CONTENT
}

/// Submit request; without `text` the current draft is sent.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    /// Replaces the draft before sending.
    #[serde(default)]
    pub text: Option<String>,
}

async fn submit_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    if let Some(text) = request.text {
        state.chat.set_pending(text).await;
    }
    let outcome = state.chat.submit().await.map_err(chat_error)?;
    Ok(Json(outcome))
}

async fn summarize_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MessageId>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = state.chat.summarize(id).await.map_err(chat_error)?;
    Ok(Json(outcome))
}

/// Translation target request.
#[derive(Debug, Deserialize)]
pub struct TranslationTargetRequest {
    /// Target language code.
    pub language: String,
}

async fn set_translation_target(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MessageId>,
    Json(request): Json<TranslationTargetRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .chat
        .set_translation_target(id, &request.language)
        .await
        .map_err(chat_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn translate_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<MessageId>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let outcome = state.chat.translate(id).await.map_err(chat_error)?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::chat::capability::scripted::Scripted;
    use crate::chat::capability::{CapabilityGateway, CapabilityGateways, CapabilityKind};
    use crate::chat::core::config::ChatConfig;
    use crate::chat::core::language::{LanguageCode, LanguageGuess, LanguagePair};
    use crate::chat::engine::ChatOrchestrator;
    use crate::chat::storage::{MemoryKvStore, SessionStore};

    async fn app() -> (Router, Arc<AppState>) {
        let gateways = CapabilityGateways {
            generation: Arc::new(CapabilityGateway::new(Scripted::new(
                CapabilityKind::Generation,
                |_: &(), prompt: String| Ok(format!("reply to {prompt}")),
            ))),
            detection: Arc::new(CapabilityGateway::new(Scripted::new(
                CapabilityKind::LanguageDetection,
                |_: &(), _text: String| {
                    Ok(vec![LanguageGuess {
                        language: LanguageCode::english(),
                        confidence: 0.99,
                    }])
                },
            ))),
            summarization: Arc::new(CapabilityGateway::new(Scripted::new(
                CapabilityKind::Summarization,
                |_: &(), _text: String| Ok("short".to_string()),
            ))),
            translation: Arc::new(CapabilityGateway::new(Scripted::new(
                CapabilityKind::Translation,
                |pair: &LanguagePair, text: String| Ok(format!("[{pair}] {text}")),
            ))),
        };
        let store = SessionStore::new(Arc::new(MemoryKvStore::new()), "cintabot");
        let chat = match ChatOrchestrator::open(&ChatConfig::default(), store, gateways).await {
            Ok(chat) => chat,
            Err(err) => panic!("open failed: {err}"),
        };
        let state = AppState::new(chat);
        (create_router(Arc::clone(&state)), state)
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        let request = match request {
            Ok(request) => request,
            Err(err) => panic!("bad request: {err}"),
        };
        let response = match app.clone().oneshot(request).await {
            Ok(response) => response,
            Err(err) => panic!("router failed: {err}"),
        };
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (app, state) = app().await;
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        state.chat.shutdown();
    }

    #[tokio::test]
    async fn test_languages() {
        let (app, state) = app().await;
        let (status, body) = call(&app, "GET", "/api/languages", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(SUPPORTED_LANGUAGES.len()));
        assert_eq!(body[0]["code"], "en");
        state.chat.shutdown();
    }

    #[tokio::test]
    async fn test_chat_flow() {
        let (app, state) = app().await;

        let (status, _) = call(&app, "POST", "/api/messages", Some(json!({"text": "hi"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, session) = call(&app, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(session["name"], "New Chat");

        let (status, _) = call(&app, "PUT", "/api/draft", Some(json!({"text": "hello"}))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, outcome) = call(&app, "POST", "/api/messages", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["appended"].as_array().map(Vec::len), Some(2));
        assert_eq!(outcome["appended"][0]["detectedLanguage"], "en");
        assert_eq!(outcome["appended"][1]["text"], "reply to hello");

        let user_id = outcome["appended"][0]["id"].as_str().unwrap_or_default().to_string();
        let (status, _) = call(
            &app,
            "PUT",
            &format!("/api/messages/{user_id}/translation-target"),
            Some(json!({"language": "fr"})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, outcome) =
            call(&app, "POST", &format!("/api/messages/{user_id}/translate"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["appended"][0]["text"], "[en/fr] hello");

        let (status, _) =
            call(&app, "POST", &format!("/api/messages/{user_id}/summarize"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, snapshot) = call(&app, "GET", "/api/state", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["messages"].as_array().map(Vec::len), Some(4));
        assert_eq!(snapshot["translationTargets"][user_id.as_str()], "fr");
        assert_eq!(snapshot["pending"], "");
        state.chat.shutdown();
    }

    #[tokio::test]
    async fn test_session_routes() {
        let (app, state) = app().await;
        let (_, first) = call(&app, "POST", "/api/sessions", None).await;
        let (_, second) = call(&app, "POST", "/api/sessions", None).await;
        let first_id = first["id"].as_str().unwrap_or_default().to_string();
        let second_id = second["id"].as_str().unwrap_or_default().to_string();

        let (status, snapshot) =
            call(&app, "PUT", &format!("/api/sessions/{first_id}/active"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["activeSession"], first_id.as_str());

        let (status, _) =
            call(&app, "DELETE", &format!("/api/sessions/{second_id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) =
            call(&app, "DELETE", &format!("/api/sessions/{second_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, snapshot) = call(&app, "GET", "/api/state", None).await;
        assert_eq!(snapshot["sessions"].as_array().map(Vec::len), Some(1));
        assert!(snapshot["activeSession"].is_null());

        let (status, _) = call(&app, "PUT", "/api/sessions/not-a-uuid/active", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        state.chat.shutdown();
    }
}
