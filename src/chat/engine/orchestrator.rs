//! Conversation orchestrator.
//!
//! Owns the active session, its message list and the pending input, and turns
//! user actions into capability calls and persisted appends. State mutation and
//! persistence run under one async mutex; capability calls run outside it, and
//! their results are appended to the session the action started in.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::chat::capability::{Activity, CapabilityError, CapabilityGateways};
use crate::chat::core::config::{ChatConfig, RenameConfig};
use crate::chat::core::errors::{ChatError, ChatResult};
use crate::chat::core::ids::{MessageId, SessionId};
use crate::chat::core::language::{LanguageCode, LanguagePair, best_guess};
use crate::chat::core::message::{Message, Role, Session};
use crate::chat::engine::policy::ReplyPolicy;
use crate::chat::engine::rename::{
    RenameFuture, RenameScheduler, RenameStep, RenameTarget, clean_title,
};
use crate::chat::storage::SessionStore;

#[derive(Default)]
struct ChatState {
    sessions: Vec<Session>,
    active: Option<SessionId>,
    messages: Vec<Message>,
    pending: String,
    targets: HashMap<MessageId, LanguageCode>,
}

impl ChatState {
    fn contains(&self, id: SessionId) -> bool {
        self.sessions.iter().any(|session| session.id == id)
    }

    fn active_message(&self, id: MessageId) -> ChatResult<(SessionId, &Message)> {
        let active = self.active.ok_or(ChatError::NoActiveSession)?;
        let message = self
            .messages
            .iter()
            .find(|message| message.id == id)
            .ok_or(ChatError::MessageNotFound(id))?;
        Ok((active, message))
    }

    /// Translation targets only live as long as their session stays active.
    fn activate(&mut self, id: Option<SessionId>, messages: Vec<Message>) {
        if self.active != id {
            self.targets.clear();
        }
        self.active = id;
        self.messages = messages;
    }
}

/// Messages appended by one transition.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TurnOutcome {
    /// Appended messages, in order. Empty when the session was deleted meanwhile
    /// or the transition was a no-op.
    pub appended: Vec<Message>,
}

impl TurnOutcome {
    fn extend(&mut self, messages: Vec<Message>) {
        self.appended.extend(messages);
    }
}

/// Read-only view of the orchestrator state.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    /// All sessions, oldest first.
    pub sessions: Vec<Session>,
    /// Active session, if any.
    pub active_session: Option<SessionId>,
    /// Messages of the active session.
    pub messages: Vec<Message>,
    /// Unsent input.
    pub pending: String,
    /// Translation targets chosen for messages of the active session.
    pub translation_targets: BTreeMap<MessageId, LanguageCode>,
    /// What the capability layer is busy with.
    pub activity: Option<Activity>,
}

/// Coordinates sessions, capabilities and persistence.
pub struct ChatOrchestrator {
    store: SessionStore,
    gateways: CapabilityGateways,
    policy: ReplyPolicy,
    rename: RenameConfig,
    state: Mutex<ChatState>,
    renamer: RenameScheduler,
}

impl ChatOrchestrator {
    /// Load persisted state and resume renames of placeholder-named sessions.
    ///
    /// A stored active pointer naming an unknown session is ignored.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or storage fails.
    pub async fn open(
        config: &ChatConfig,
        store: SessionStore,
        gateways: CapabilityGateways,
    ) -> ChatResult<Arc<Self>> {
        let policy = ReplyPolicy::from_config(&config.policy)?;
        let sessions = store.list_sessions().await?;
        let active = store
            .load_active_session()
            .await?
            .filter(|id| sessions.iter().any(|session| session.id == *id));
        let messages = match active {
            Some(id) => store.load_messages(id).await?,
            None => Vec::new(),
        };
        let placeholders: Vec<SessionId> = sessions
            .iter()
            .filter(|session| session.has_placeholder_name())
            .map(|session| session.id)
            .collect();

        info!(
            sessions = sessions.len(),
            active = ?active,
            "Opened chat state"
        );

        let orchestrator = Arc::new(Self {
            store,
            gateways,
            policy,
            rename: config.rename.clone(),
            state: Mutex::new(ChatState {
                sessions,
                active,
                messages,
                pending: String::new(),
                targets: HashMap::new(),
            }),
            renamer: RenameScheduler::new(config.rename.clone()),
        });

        for id in placeholders {
            orchestrator.renamer.schedule(Arc::downgrade(&orchestrator), id);
        }
        Ok(orchestrator)
    }

    /// Current state as served to clients.
    pub async fn snapshot(&self) -> ChatSnapshot {
        let state = self.state.lock().await;
        let translation_targets = state
            .targets
            .iter()
            .map(|(id, target)| (*id, target.clone()))
            .collect();
        ChatSnapshot {
            sessions: state.sessions.clone(),
            active_session: state.active,
            messages: state.messages.clone(),
            pending: state.pending.clone(),
            translation_targets,
            activity: self.gateways.activity(),
        }
    }

    /// What the capability layer is busy with.
    #[must_use]
    pub fn activity(&self) -> Option<Activity> {
        self.gateways.activity()
    }

    /// Pending rename tasks.
    #[must_use]
    pub const fn renamer(&self) -> &RenameScheduler {
        &self.renamer
    }

    /// Create a session, make it active and schedule its rename.
    ///
    /// # Errors
    /// Returns an error if storage fails; the state is then unchanged.
    #[instrument(skip(self))]
    pub async fn new_chat(self: &Arc<Self>) -> ChatResult<Session> {
        let session = Session::placeholder();
        let seed = vec![Message::greeting()];
        {
            let mut state = self.state.lock().await;
            let mut sessions = state.sessions.clone();
            sessions.push(session.clone());
            self.store.create_session(&session, &sessions, &seed).await?;

            state.sessions = sessions;
            state.activate(Some(session.id), seed);
        }
        self.renamer.schedule(Arc::downgrade(self), session.id);
        Ok(session)
    }

    /// Make `id` the active session and load its messages.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for unknown ids, or a storage error.
    #[instrument(skip(self))]
    pub async fn switch_session(&self, id: SessionId) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        if !state.contains(id) {
            return Err(ChatError::SessionNotFound(id));
        }
        let messages = self.store.load_messages(id).await?;
        self.store.save_active_session(Some(id)).await?;
        state.activate(Some(id), messages);
        debug!(session_id = %id, "Switched session");
        Ok(())
    }

    /// Delete a session and its messages, and clear the active session.
    ///
    /// # Errors
    /// Returns `SessionNotFound` for unknown ids, or a storage error.
    #[instrument(skip(self))]
    pub async fn delete_session(&self, id: SessionId) -> ChatResult<()> {
        let mut state = self.state.lock().await;
        if !state.contains(id) {
            return Err(ChatError::SessionNotFound(id));
        }
        self.renamer.cancel(id);

        let remaining: Vec<Session> = state
            .sessions
            .iter()
            .filter(|session| session.id != id)
            .cloned()
            .collect();
        self.store.delete_session(id, &remaining).await?;

        state.sessions = remaining;
        state.activate(None, Vec::new());
        Ok(())
    }

    /// Replace the unsent input.
    pub async fn set_pending(&self, text: String) {
        self.state.lock().await.pending = text;
    }

    /// Current unsent input.
    pub async fn pending(&self) -> String {
        self.state.lock().await.pending.clone()
    }

    /// Send the pending input.
    ///
    /// Detects its language, appends it as a user message, and generates a
    /// reply when the reply policy allows. A failed detection appends an error
    /// message and keeps the pending input, and so does a failed write.
    ///
    /// # Errors
    /// Returns `NoActiveSession`, `EmptyInput`, or a storage error.
    #[instrument(skip(self))]
    pub async fn submit(&self) -> ChatResult<TurnOutcome> {
        let (session, text) = {
            let state = self.state.lock().await;
            let session = state.active.ok_or(ChatError::NoActiveSession)?;
            if state.pending.trim().is_empty() {
                return Err(ChatError::EmptyInput);
            }
            (session, state.pending.clone())
        };

        let mut outcome = TurnOutcome::default();
        let language = match self.detect(&text).await {
            Ok(language) => language,
            Err(err) => {
                warn!(session_id = %session, ?err, "Language detection failed");
                outcome.extend(self.append(session, vec![Message::error(err.to_string())]).await?);
                return Ok(outcome);
            }
        };
        debug!(session_id = %session, %language, "Detected input language");

        let auto_reply = self.policy.should_auto_reply(&language, &text);
        let user = Message::user(text.clone(), language);
        {
            let mut state = self.state.lock().await;
            outcome.extend(self.append_locked(&mut state, session, vec![user]).await?);
            if state.pending == text {
                state.pending.clear();
            }
        }

        if auto_reply {
            let reply = match self.gateways.generation.invoke((), text).await {
                Ok(reply) => Message::assistant(reply),
                Err(err) => {
                    warn!(session_id = %session, ?err, "Reply generation failed");
                    Message::error(err.to_string())
                }
            };
            outcome.extend(self.append(session, vec![reply]).await?);
        }
        Ok(outcome)
    }

    async fn detect(&self, text: &str) -> Result<LanguageCode, CapabilityError> {
        let guesses = self.gateways.detection.invoke((), text.to_string()).await?;
        best_guess(&guesses)
            .map(|guess| guess.language.clone())
            .ok_or(CapabilityError::NoLanguageDetected)
    }

    /// Summarize a long message of the active session.
    ///
    /// # Errors
    /// Returns `NoActiveSession`, `MessageNotFound`, `NotSummarizable`, or a
    /// storage error.
    #[instrument(skip(self))]
    pub async fn summarize(&self, message_id: MessageId) -> ChatResult<TurnOutcome> {
        let (session, text) = {
            let state = self.state.lock().await;
            let (session, message) = state.active_message(message_id)?;
            if !self.policy.can_summarize(message) {
                return Err(ChatError::NotSummarizable(message_id));
            }
            (session, message.text.clone())
        };

        let summary = match self.gateways.summarization.invoke((), text).await {
            Ok(summary) => Message::assistant(summary),
            Err(err) => {
                warn!(session_id = %session, ?err, "Summarization failed");
                Message::error(err.to_string())
            }
        };
        Ok(TurnOutcome {
            appended: self.append(session, vec![summary]).await?,
        })
    }

    /// Remember the language a user message should be translated into.
    ///
    /// # Errors
    /// Returns `UnsupportedLanguage`, `NoActiveSession`, `MessageNotFound` or
    /// `NotTranslatable`.
    pub async fn set_translation_target(
        &self,
        message_id: MessageId,
        language: &str,
    ) -> ChatResult<()> {
        let target = language
            .parse::<LanguageCode>()
            .ok()
            .filter(LanguageCode::is_supported)
            .ok_or_else(|| ChatError::UnsupportedLanguage(language.to_string()))?;

        let mut state = self.state.lock().await;
        if state.active_message(message_id)?.1.role != Role::User {
            return Err(ChatError::NotTranslatable(message_id));
        }
        state.targets.insert(message_id, target);
        Ok(())
    }

    /// Translation target chosen for a message of the active session.
    pub async fn translation_target(&self, message_id: MessageId) -> Option<LanguageCode> {
        self.state.lock().await.targets.get(&message_id).cloned()
    }

    /// Translate a user message into its chosen target language.
    ///
    /// Without a target, or when the target is the detected language, nothing
    /// is appended.
    ///
    /// # Errors
    /// Returns `NoActiveSession`, `MessageNotFound`, `NotTranslatable`, or a
    /// storage error.
    #[instrument(skip(self))]
    pub async fn translate(&self, message_id: MessageId) -> ChatResult<TurnOutcome> {
        let (session, pair, text) = {
            let state = self.state.lock().await;
            let (session, message) = state.active_message(message_id)?;
            let source = match (message.role, &message.detected_language) {
                (Role::User, Some(source)) => source.clone(),
                _ => return Err(ChatError::NotTranslatable(message_id)),
            };
            let Some(target) = state.targets.get(&message_id).cloned() else {
                return Ok(TurnOutcome::default());
            };
            if target == source {
                return Ok(TurnOutcome::default());
            }
            (session, LanguagePair::new(source, target), message.text.clone())
        };

        let translated = match self.gateways.translation.invoke(pair.clone(), text).await {
            Ok(translated) => Message::assistant(translated),
            Err(err) => {
                warn!(session_id = %session, %pair, ?err, "Translation failed");
                Message::error(err.to_string())
            }
        };
        Ok(TurnOutcome {
            appended: self.append(session, vec![translated]).await?,
        })
    }

    async fn append(&self, session: SessionId, messages: Vec<Message>) -> ChatResult<Vec<Message>> {
        let mut state = self.state.lock().await;
        self.append_locked(&mut state, session, messages).await
    }

    /// Append to `session`: in memory when it is active, otherwise to its
    /// persisted list. Dropped when the session no longer exists. Memory is
    /// only updated once the write succeeded.
    async fn append_locked(
        &self,
        state: &mut ChatState,
        session: SessionId,
        messages: Vec<Message>,
    ) -> ChatResult<Vec<Message>> {
        if state.active == Some(session) {
            let mut updated = state.messages.clone();
            updated.extend(messages.iter().cloned());
            self.store.save_messages(Some(session), &updated).await?;
            state.messages = updated;
        } else if state.contains(session) {
            let mut stored = self.store.load_messages(session).await?;
            stored.extend(messages.iter().cloned());
            self.store.save_messages(Some(session), &stored).await?;
        } else {
            debug!(session_id = %session, "Session deleted, dropping messages");
            return Ok(Vec::new());
        }
        Ok(messages)
    }

    fn rename_prompt(&self, messages: &[Message]) -> String {
        let transcript = messages
            .iter()
            .filter(|message| !message.is_error)
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "In a {} word sentence, give me a summary of the text below\n{transcript}",
            self.rename.title_words
        )
    }

    async fn try_rename(&self, id: SessionId) -> ChatResult<RenameStep> {
        let prompt = {
            let state = self.state.lock().await;
            match state.sessions.iter().find(|session| session.id == id) {
                Some(session) if session.has_placeholder_name() => {}
                _ => return Ok(RenameStep::Gone),
            }
            let messages = self.store.load_messages(id).await?;
            let replies = messages
                .iter()
                .filter(|message| message.role == Role::Assistant)
                .count();
            if replies <= 1 {
                return Ok(RenameStep::Retry);
            }
            self.rename_prompt(&messages)
        };

        let title = match self.gateways.generation.invoke((), prompt).await {
            Ok(raw) => clean_title(&raw, self.rename.max_title_chars),
            Err(err) => {
                warn!(session_id = %id, ?err, "Title generation failed");
                return Ok(RenameStep::Retry);
            }
        };
        let Some(title) = title else {
            return Ok(RenameStep::Retry);
        };

        let mut state = self.state.lock().await;
        let mut sessions = state.sessions.clone();
        let Some(session) = sessions.iter_mut().find(|session| session.id == id) else {
            return Ok(RenameStep::Gone);
        };
        if !session.has_placeholder_name() {
            return Ok(RenameStep::Gone);
        }
        session.name = title;
        self.store.save_sessions(&sessions).await?;
        state.sessions = sessions;
        Ok(RenameStep::Renamed)
    }

    /// Stop background work.
    pub fn shutdown(&self) {
        self.renamer.cancel_all();
    }
}

impl RenameTarget for ChatOrchestrator {
    fn attempt_rename(&self, id: SessionId) -> RenameFuture<'_> {
        Box::pin(self.try_rename(id))
    }
}
