//! Session, active-pointer and message-list records over a key-value backend.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::SessionId;
use crate::chat::core::message::{Message, Session};
use crate::chat::storage::kv_store::{KeyValueStore, KvWrite};

/// Typed access to the persisted chat records.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl SessionStore {
    /// Create a store whose keys start with `prefix`.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    fn sessions_key(&self) -> String {
        format!("{}::sessions", self.prefix)
    }

    fn active_key(&self) -> String {
        format!("{}::activeSession", self.prefix)
    }

    fn messages_key(&self, id: SessionId) -> String {
        format!("{}::messages::{id}", self.prefix)
    }

    async fn read<T: DeserializeOwned>(&self, key: &str) -> ChatResult<Option<T>> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn put<T: Serialize + ?Sized>(key: String, value: &T) -> ChatResult<KvWrite> {
        Ok(KvWrite::put(key, serde_json::to_string(value)?))
    }

    /// Persisted session list, empty when nothing was stored yet.
    ///
    /// # Errors
    /// Returns an error if storage access or decoding fails.
    pub async fn list_sessions(&self) -> ChatResult<Vec<Session>> {
        Ok(self
            .read::<Vec<Session>>(&self.sessions_key())
            .await?
            .unwrap_or_default())
    }

    /// Persisted active session pointer.
    ///
    /// # Errors
    /// Returns an error if storage access or decoding fails.
    pub async fn load_active_session(&self) -> ChatResult<Option<SessionId>> {
        self.read(&self.active_key()).await
    }

    /// Message list of a session, or a fresh greeting seed when none is stored.
    ///
    /// The seed is not written back.
    ///
    /// # Errors
    /// Returns an error if storage access or decoding fails.
    pub async fn load_messages(&self, id: SessionId) -> ChatResult<Vec<Message>> {
        match self.read::<Vec<Message>>(&self.messages_key(id)).await? {
            Some(messages) if !messages.is_empty() => Ok(messages),
            Some(_) => {
                warn!(session_id = %id, "Stored message list is empty, reseeding");
                Ok(vec![Message::greeting()])
            }
            None => Ok(vec![Message::greeting()]),
        }
    }

    /// Overwrite the message list of `active`.
    ///
    /// Does nothing when no session is active or `messages` is empty.
    ///
    /// # Errors
    /// Returns an error if storage access or encoding fails.
    pub async fn save_messages(
        &self,
        active: Option<SessionId>,
        messages: &[Message],
    ) -> ChatResult<()> {
        let Some(id) = active else {
            return Ok(());
        };
        if messages.is_empty() {
            return Ok(());
        }
        let write = Self::put(self.messages_key(id), messages)?;
        self.kv.apply(vec![write]).await?;
        debug!(session_id = %id, count = messages.len(), "Saved messages");
        Ok(())
    }

    /// Overwrite the session list.
    ///
    /// # Errors
    /// Returns an error if storage access or encoding fails.
    pub async fn save_sessions(&self, sessions: &[Session]) -> ChatResult<()> {
        let write = Self::put(self.sessions_key(), sessions)?;
        self.kv.apply(vec![write]).await
    }

    /// Persist the active pointer. An unset pointer is never written.
    ///
    /// # Errors
    /// Returns an error if storage access or encoding fails.
    pub async fn save_active_session(&self, active: Option<SessionId>) -> ChatResult<()> {
        let Some(id) = active else {
            return Ok(());
        };
        let write = Self::put(self.active_key(), &id)?;
        self.kv.apply(vec![write]).await
    }

    /// Remove a session's messages and write the remaining session list.
    ///
    /// The stored active pointer is dropped in the same transaction when it
    /// names `id`.
    ///
    /// # Errors
    /// Returns an error if storage access or encoding fails.
    pub async fn delete_session(&self, id: SessionId, remaining: &[Session]) -> ChatResult<()> {
        let mut writes = vec![
            KvWrite::delete(self.messages_key(id)),
            Self::put(self.sessions_key(), remaining)?,
        ];
        if self.load_active_session().await? == Some(id) {
            writes.push(KvWrite::delete(self.active_key()));
        }
        self.kv.apply(writes).await?;
        info!(session_id = %id, "Deleted session");
        Ok(())
    }

    /// Write the session list, the active pointer and the seeded message list
    /// of a new session at once.
    ///
    /// # Errors
    /// Returns an error if storage access or encoding fails.
    pub async fn create_session(
        &self,
        session: &Session,
        sessions: &[Session],
        seed: &[Message],
    ) -> ChatResult<()> {
        let writes = vec![
            Self::put(self.sessions_key(), sessions)?,
            Self::put(self.active_key(), &session.id)?,
            Self::put(self.messages_key(session.id), seed)?,
        ];
        self.kv.apply(writes).await?;
        info!(session_id = %session.id, "Created session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::core::language::LanguageCode;
    use crate::chat::core::message::GREETING;
    use crate::chat::storage::kv_store::MemoryKvStore;

    fn store() -> (Arc<MemoryKvStore>, SessionStore) {
        let kv = Arc::new(MemoryKvStore::new());
        let store = SessionStore::new(kv.clone(), "cintabot");
        (kv, store)
    }

    #[tokio::test]
    async fn test_empty_store_defaults() {
        let (kv, store) = store();
        assert!(store.list_sessions().await.unwrap_or_default().is_empty());
        assert_eq!(store.load_active_session().await.ok().flatten(), None);

        let seeded = store.load_messages(SessionId::new()).await.unwrap_or_default();
        assert_eq!(seeded.len(), 1);
        assert_eq!(seeded[0].text, GREETING);
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn test_seed_gets_fresh_ids() {
        let (_, store) = store();
        let id = SessionId::new();
        let first = store.load_messages(id).await.unwrap_or_default();
        let second = store.load_messages(id).await.unwrap_or_default();
        assert_ne!(first[0].id, second[0].id);
    }

    #[tokio::test]
    async fn test_save_and_reload_messages() {
        let (_, store) = store();
        let id = SessionId::new();
        let messages = vec![
            Message::greeting(),
            Message::user("hello there", LanguageCode::english()),
            Message::assistant("hi!"),
        ];
        assert!(store.save_messages(Some(id), &messages).await.is_ok());
        let loaded = store.load_messages(id).await.unwrap_or_default();
        assert_eq!(loaded, messages);
    }

    #[tokio::test]
    async fn test_save_messages_noops() {
        let (kv, store) = store();
        assert!(store.save_messages(None, &[Message::greeting()]).await.is_ok());
        assert!(store.save_messages(Some(SessionId::new()), &[]).await.is_ok());
        assert!(store.save_active_session(None).await.is_ok());
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_session_writes_all_records() {
        let (kv, store) = store();
        let session = Session::placeholder();
        let seed = vec![Message::greeting()];
        let created = store
            .create_session(&session, std::slice::from_ref(&session), &seed)
            .await;
        assert!(created.is_ok());
        assert_eq!(kv.len().await, 3);
        assert_eq!(store.list_sessions().await.unwrap_or_default(), vec![session.clone()]);
        assert_eq!(store.load_active_session().await.ok().flatten(), Some(session.id));
        assert_eq!(store.load_messages(session.id).await.unwrap_or_default(), seed);
    }

    #[tokio::test]
    async fn test_delete_active_session_clears_pointer() {
        let (kv, store) = store();
        let keep = Session::placeholder();
        let gone = Session::placeholder();
        let all = vec![keep.clone(), gone.clone()];
        assert!(store.create_session(&keep, &all, &[Message::greeting()]).await.is_ok());
        assert!(store.create_session(&gone, &all, &[Message::greeting()]).await.is_ok());

        assert!(store.delete_session(gone.id, std::slice::from_ref(&keep)).await.is_ok());
        assert_eq!(store.list_sessions().await.unwrap_or_default(), vec![keep.clone()]);
        assert_eq!(store.load_active_session().await.ok().flatten(), None);
        assert!(
            kv.get(&format!("cintabot::messages::{}", gone.id))
                .await
                .ok()
                .flatten()
                .is_none()
        );
        assert!(
            kv.get(&format!("cintabot::messages::{}", keep.id))
                .await
                .ok()
                .flatten()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_delete_inactive_session_keeps_pointer() {
        let (_, store) = store();
        let first = Session::placeholder();
        let second = Session::placeholder();
        let all = vec![first.clone(), second.clone()];
        assert!(store.create_session(&first, &all, &[Message::greeting()]).await.is_ok());
        assert!(store.create_session(&second, &all, &[Message::greeting()]).await.is_ok());

        assert!(store.delete_session(first.id, std::slice::from_ref(&second)).await.is_ok());
        assert_eq!(store.load_active_session().await.ok().flatten(), Some(second.id));
    }

    #[tokio::test]
    async fn test_records_use_prefixed_keys() {
        let (kv, store) = store();
        let id = SessionId::new();
        assert!(store.save_active_session(Some(id)).await.is_ok());
        let raw = kv.get("cintabot::activeSession").await.ok().flatten();
        assert_eq!(raw, Some(format!("\"{id}\"")));
    }
}
