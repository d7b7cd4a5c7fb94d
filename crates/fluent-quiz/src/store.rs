//! Per-session key-value store.
//!
//! Each session key owns one actor: a tokio task holding that session's
//! [`SessionSlots`] and a command channel. Every operation is a job sent to
//! the actor and run to completion before the next one starts, so operations
//! on one key never interleave while different keys run concurrently.
//!
//! Actors are spawned lazily on first access and retained for the lifetime
//! of the store. A job that panics fails only its own caller; the actor
//! keeps running with whatever the slots held when the panic unwound. Nothing here spans more than one job: "read stats, then
//! write stats" is two jobs and can race with another caller doing the same.
//! Use [`SessionStore::update`] when a read-modify-write must be atomic.
//!
//! # Example
//!
//! ```no_run
//! use fluent_quiz::{QuizStats, SessionKey, SessionStore};
//!
//! # async fn example() -> fluent_quiz::Result<()> {
//! let store = SessionStore::new(50);
//! let key = SessionKey::new("quiz_spanish");
//!
//! assert_eq!(store.get_stats(&key).await?, None);
//! store.put_stats(&key, QuizStats { correct: 1, total: 1, streak: 1 }).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

use crate::engine::truncate_oldest;
use crate::error::{QuizError, Result};
use crate::model::{ChatMessage, QuizHistoryEntry, QuizStats, SessionKey};

/// Jobs queued per session before senders wait.
const COMMAND_BUFFER: usize = 32;

/// A named slot in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Slot {
    /// Ordered chat messages.
    ChatHistory,
    /// Running quiz totals.
    QuizStats,
    /// Graded answers, oldest first.
    QuizHistory,
}

impl Slot {
    /// Returns the slot name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChatHistory => "chat-history",
            Self::QuizStats => "quiz-stats",
            Self::QuizHistory => "quiz-history",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything stored for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSlots {
    /// Contents of `chat-history`.
    pub chat_history: Vec<ChatMessage>,
    /// Contents of `quiz-stats`; `None` until first written.
    pub quiz_stats: Option<QuizStats>,
    /// Contents of `quiz-history`, oldest first.
    pub quiz_history: Vec<QuizHistoryEntry>,
}

impl SessionSlots {
    /// Clears one slot back to its absent state.
    pub fn clear(&mut self, slot: Slot) {
        match slot {
            Slot::ChatHistory => self.chat_history.clear(),
            Slot::QuizStats => self.quiz_stats = None,
            Slot::QuizHistory => self.quiz_history.clear(),
        }
    }
}

type Job = Box<dyn FnOnce(&mut SessionSlots) + Send>;

/// The task owning one session's slots.
struct SessionActor {
    key: SessionKey,
    slots: SessionSlots,
    jobs: mpsc::Receiver<Job>,
}

impl SessionActor {
    async fn run(mut self) {
        debug!(session = %self.key, "Session actor started");
        while let Some(job) = self.jobs.recv().await {
            // the reply sender is dropped during unwinding, so the caller
            // sees the failure and the other slots survive
            if panic::catch_unwind(AssertUnwindSafe(|| job(&mut self.slots))).is_err() {
                warn!(session = %self.key, "Session job panicked");
            }
        }
        debug!(session = %self.key, "Session actor stopped");
    }
}

/// Keyed arena of session actors.
///
/// Cloning is cheap; clones share the same sessions.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<SessionKey, mpsc::Sender<Job>>>>,
    history_cap: usize,
    // each put_* call takes one permit before it is sent
    #[cfg(test)]
    write_gate: Option<Arc<tokio::sync::Semaphore>>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("history_cap", &self.history_cap)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Creates an empty store whose history slots hold at most `history_cap` items.
    #[must_use]
    pub fn new(history_cap: usize) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            history_cap,
            #[cfg(test)]
            write_gate: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_write_gate(mut self, gate: Arc<tokio::sync::Semaphore>) -> Self {
        self.write_gate = Some(gate);
        self
    }

    #[cfg(test)]
    async fn pass_write_gate(&self) {
        if let Some(gate) = &self.write_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    /// Maximum length of each history slot.
    #[must_use]
    pub const fn history_cap(&self) -> usize {
        self.history_cap
    }

    /// Number of sessions that have been touched.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Runs `f` against the session's slots as one uninterrupted operation.
    ///
    /// This is the only read-modify-write primitive; every other method is
    /// built on it and is atomic on its own.
    pub async fn update<R, F>(&self, key: &SessionKey, f: F) -> Result<R>
    where
        F: FnOnce(&mut SessionSlots) -> R + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.actor(key).await;
        let (reply, result) = oneshot::channel();
        let job: Job = Box::new(move |slots| {
            // receiver gone means the caller was cancelled
            let _ = reply.send(f(slots));
        });

        if sender.send(job).await.is_err() {
            self.forget(key, &sender).await;
            return Err(QuizError::session_unavailable(key, "session actor is not running"));
        }

        match result.await {
            Ok(value) => Ok(value),
            Err(_) if sender.is_closed() => {
                self.forget(key, &sender).await;
                Err(QuizError::session_unavailable(
                    key,
                    "session actor stopped before replying",
                ))
            }
            Err(_) => Err(QuizError::session_unavailable(
                key,
                "session job failed before replying",
            )),
        }
    }

    /// Reads `quiz-stats`; `None` if never written or deleted.
    pub async fn get_stats(&self, key: &SessionKey) -> Result<Option<QuizStats>> {
        self.update(key, |slots| slots.quiz_stats).await
    }

    /// Overwrites `quiz-stats`.
    pub async fn put_stats(&self, key: &SessionKey, stats: QuizStats) -> Result<()> {
        #[cfg(test)]
        self.pass_write_gate().await;
        self.update(key, move |slots| slots.quiz_stats = Some(stats))
            .await
    }

    /// Reads `quiz-history`, oldest first.
    pub async fn get_quiz_history(&self, key: &SessionKey) -> Result<Vec<QuizHistoryEntry>> {
        self.update(key, |slots| slots.quiz_history.clone()).await
    }

    /// Overwrites `quiz-history`, keeping only the newest `history_cap` entries.
    pub async fn put_quiz_history(
        &self,
        key: &SessionKey,
        mut history: Vec<QuizHistoryEntry>,
    ) -> Result<()> {
        truncate_oldest(&mut history, self.history_cap);
        #[cfg(test)]
        self.pass_write_gate().await;
        self.update(key, move |slots| slots.quiz_history = history)
            .await
    }

    /// Reads `chat-history`, oldest first.
    pub async fn get_chat_history(&self, key: &SessionKey) -> Result<Vec<ChatMessage>> {
        self.update(key, |slots| slots.chat_history.clone()).await
    }

    /// Appends one message to `chat-history` and returns the updated sequence.
    pub async fn append_chat(
        &self,
        key: &SessionKey,
        message: ChatMessage,
    ) -> Result<Vec<ChatMessage>> {
        let cap = self.history_cap;
        self.update(key, move |slots| {
            slots.chat_history.push(message);
            truncate_oldest(&mut slots.chat_history, cap);
            slots.chat_history.clone()
        })
        .await
    }

    /// Clears one slot. Deleting an absent slot is not an error.
    pub async fn delete(&self, key: &SessionKey, slot: Slot) -> Result<()> {
        self.update(key, move |slots| slots.clear(slot)).await
    }

    /// Returns the sender for `key`, spawning its actor on first access.
    async fn actor(&self, key: &SessionKey) -> mpsc::Sender<Job> {
        let mut sessions = self.sessions.lock().await;
        if let Some(sender) = sessions.get(key) {
            return sender.clone();
        }

        let (sender, jobs) = mpsc::channel(COMMAND_BUFFER);
        let actor = SessionActor {
            key: key.clone(),
            slots: SessionSlots::default(),
            jobs,
        };
        tokio::spawn(actor.run());
        sessions.insert(key.clone(), sender.clone());
        debug!(session = %key, total = sessions.len(), "Spawned session actor");
        sender
    }

    /// Drops a dead actor's handle so the next access starts a fresh one.
    async fn forget(&self, key: &SessionKey, dead: &mpsc::Sender<Job>) {
        let mut sessions = self.sessions.lock().await;
        if sessions
            .get(key)
            .is_some_and(|current| current.same_channel(dead))
        {
            sessions.remove(key);
            warn!(session = %key, "Session actor died; its state was lost");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
