//! Background renaming of placeholder-named sessions.
//!
//! Each scheduled session gets one task that sleeps, asks its target to try a
//! rename, and backs off until the target reports success, the session is gone,
//! the attempts run out, or the task is cancelled.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::chat::core::config::RenameConfig;
use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::SessionId;

/// Boxed future returned by [`RenameTarget::attempt_rename`].
pub type RenameFuture<'a> = Pin<Box<dyn Future<Output = ChatResult<RenameStep>> + Send + 'a>>;

/// Result of one rename attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RenameStep {
    /// The session got its title.
    Renamed,
    /// Not enough conversation yet (or the title call failed); check later.
    Retry,
    /// The session was deleted or already renamed.
    Gone,
}

/// Something that can try to rename a session.
pub trait RenameTarget: Send + Sync + 'static {
    /// Try once to replace the placeholder name of `id`.
    fn attempt_rename(&self, id: SessionId) -> RenameFuture<'_>;
}

/// Spawns and cancels per-session rename tasks.
pub struct RenameScheduler {
    config: RenameConfig,
    tasks: Arc<DashMap<SessionId, Arc<Notify>>>,
}

impl RenameScheduler {
    /// Create a scheduler with no task running.
    #[must_use]
    pub fn new(config: RenameConfig) -> Self {
        Self {
            config,
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Start a rename task for `id`, replacing any earlier one.
    ///
    /// The task holds only a weak reference, so it ends once the target is
    /// dropped.
    pub fn schedule<T: RenameTarget>(&self, target: Weak<T>, id: SessionId) {
        let cancel = Arc::new(Notify::new());
        if let Some(previous) = self.tasks.insert(id, Arc::clone(&cancel)) {
            previous.notify_one();
        }

        let tasks = Arc::clone(&self.tasks);
        let config = self.config.clone();
        tokio::spawn(async move {
            run_renames(&target, id, &config, &cancel).await;
            tasks.remove_if(&id, |_, current| Arc::ptr_eq(current, &cancel));
        });
        debug!(session_id = %id, "Scheduled session rename");
    }

    /// Stop the rename task of `id`, if any.
    pub fn cancel(&self, id: SessionId) {
        if let Some((_, cancel)) = self.tasks.remove(&id) {
            cancel.notify_one();
            debug!(session_id = %id, "Cancelled session rename");
        }
    }

    /// Stop every rename task.
    pub fn cancel_all(&self) {
        let ids: Vec<SessionId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.cancel(id);
        }
    }

    /// Whether a rename task is pending for `id`.
    #[must_use]
    pub fn is_scheduled(&self, id: SessionId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Number of pending rename tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

async fn run_renames<T: RenameTarget>(
    target: &Weak<T>,
    id: SessionId,
    config: &RenameConfig,
    cancel: &Notify,
) {
    for attempt in 1..=config.max_attempts {
        tokio::select! {
            () = tokio::time::sleep(config.delay_for(attempt)) => {}
            () = cancel.notified() => {
                return;
            }
        }

        let Some(target) = target.upgrade() else {
            return;
        };
        match target.attempt_rename(id).await {
            Ok(RenameStep::Renamed) => {
                info!(session_id = %id, attempt, "Session renamed");
                return;
            }
            Ok(RenameStep::Gone) => return,
            Ok(RenameStep::Retry) => {
                debug!(session_id = %id, attempt, "Session not ready for a title yet");
            }
            Err(err) => {
                warn!(session_id = %id, attempt, ?err, "Rename attempt failed");
            }
        }
    }
    warn!(session_id = %id, attempts = config.max_attempts, "Giving up on session rename");
}

/// Turn a generated summary into a session title.
///
/// Keeps the first non-empty line, strips quoting and markdown emphasis, and
/// truncates to `max_chars` characters.
#[must_use]
pub fn clean_title(raw: &str, max_chars: usize) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    let line = line
        .trim_start_matches('#')
        .trim_matches(|ch: char| ch == '"' || ch == '\'' || ch == '*' || ch == '`')
        .trim()
        .trim_end_matches('.')
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(line.chars().take(max_chars).collect::<String>().trim_end().to_string())
}
