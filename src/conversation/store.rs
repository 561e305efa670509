//! In-memory, per-session conversation history.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::conversation::turn::{Role, Turn};
use crate::core::config::ConversationConfig;
use crate::core::errors::{ConfigError, ConfigResult, ConversationError, ConversationResult};
use crate::core::ids::SessionId;

/// Ordered turn history keyed by session.
///
/// Appends are atomic with respect to readers: a snapshot sees either all of
/// an exchange or none of it. Sessions beyond `max_sessions` are evicted in
/// least-recently-used order.
pub struct ConversationStore {
    config: ConversationConfig,
    sessions: Mutex<LruCache<SessionId, Vec<Turn>>>,
}

impl ConversationStore {
    /// Create an empty store.
    ///
    /// # Errors
    /// Returns an error if `max_sessions` is zero.
    pub fn new(config: ConversationConfig) -> ConfigResult<Self> {
        let capacity = NonZeroUsize::new(config.max_sessions).ok_or_else(|| {
            ConfigError::Invalid("conversation.max_sessions must be > 0".to_string())
        })?;

        Ok(Self {
            config,
            sessions: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Append one turn to the end of a session.
    ///
    /// # Errors
    /// Returns an error if `content` is blank.
    pub fn append_turn(
        &self,
        session: SessionId,
        role: Role,
        content: impl Into<String>,
    ) -> ConversationResult<()> {
        let content = content.into();
        ensure_content(&content)?;

        let mut sessions = self.lock();
        let turns = session_turns(&mut sessions, session);
        turns.push(Turn::new(role, content));
        truncate_front(turns, self.config.max_turns_per_session);
        Ok(())
    }

    /// Append a user prompt and its response under a single lock.
    ///
    /// # Errors
    /// Returns an error if either side is blank; nothing is stored then.
    pub fn append_exchange(
        &self,
        session: SessionId,
        prompt: impl Into<String>,
        response: impl Into<String>,
    ) -> ConversationResult<()> {
        let prompt = prompt.into();
        let response = response.into();
        ensure_content(&prompt)?;
        ensure_content(&response)?;

        let mut sessions = self.lock();
        let turns = session_turns(&mut sessions, session);
        turns.push(Turn::user(prompt));
        turns.push(Turn::assistant(response));
        truncate_front(turns, self.config.max_turns_per_session);
        debug!("Committed exchange for session {session} ({} turns)", turns.len());
        Ok(())
    }

    /// Turns to send to the text backend, oldest first.
    ///
    /// Limited to `context_window_turns` most recent turns and never starts
    /// with an assistant turn.
    #[must_use]
    pub fn context_snapshot(&self, session: SessionId) -> Vec<Turn> {
        let mut sessions = self.lock();
        let Some(turns) = sessions.get(&session) else {
            return Vec::new();
        };

        let window = match self.config.context_window_turns {
            0 => turns.len(),
            n => n.min(turns.len()),
        };
        let start = exchange_boundary(turns, turns.len() - window);
        turns[start..].to_vec()
    }

    /// Every stored turn of a session, without applying the context window.
    #[must_use]
    pub fn history(&self, session: SessionId) -> Vec<Turn> {
        self.lock().peek(&session).cloned().unwrap_or_default()
    }

    /// Number of stored turns for a session.
    #[must_use]
    pub fn len(&self, session: SessionId) -> usize {
        self.lock().peek(&session).map_or(0, Vec::len)
    }

    /// Whether a session has no stored turns.
    #[must_use]
    pub fn is_empty(&self, session: SessionId) -> bool {
        self.len(session) == 0
    }

    /// Drop a session's history. Returns whether it existed.
    pub fn clear(&self, session: SessionId) -> bool {
        self.lock().pop(&session).is_some()
    }

    /// Number of sessions currently held.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<SessionId, Vec<Turn>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ensure_content(content: &str) -> ConversationResult<()> {
    if content.trim().is_empty() {
        return Err(ConversationError::EmptyContent);
    }
    Ok(())
}

fn session_turns(
    sessions: &mut LruCache<SessionId, Vec<Turn>>,
    session: SessionId,
) -> &mut Vec<Turn> {
    if !sessions.contains(&session) && sessions.len() == sessions.cap().get() {
        if let Some((evicted, _)) = sessions.pop_lru() {
            debug!("Evicted conversation {evicted}");
        }
    }
    sessions.get_or_insert_mut(session, Vec::new)
}

/// First index at or after `start` that is not an assistant turn.
fn exchange_boundary(turns: &[Turn], start: usize) -> usize {
    let mut index = start;
    while index < turns.len() && turns[index].role == Role::Assistant {
        index += 1;
    }
    index
}

fn truncate_front(turns: &mut Vec<Turn>, max: usize) {
    if turns.len() <= max {
        return;
    }
    let cut = exchange_boundary(turns, turns.len() - max);
    turns.drain(..cut);
}
