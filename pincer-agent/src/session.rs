//! Per-chat conversation windows, kept in memory only.
//!
//! Sessions never touch disk: a restart clears them all, which is the
//! intended behavior. Long-term knowledge belongs in `pincer-memory`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::types::ChatMessage;

/// How many messages a session keeps before the oldest are dropped.
pub const MAX_CONTEXT_MESSAGES: usize = 20;

/// Idle time after which a session is discarded.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

struct Session {
    messages: Vec<ChatMessage>,
    last_activity: Instant,
}

/// In-memory store of rolling conversation windows, keyed by Telegram
/// chat id.
///
/// Expiry is lazy: nothing runs in the background, a stale session is
/// dropped the next time it is read or counted.
pub struct SessionStore {
    sessions: Mutex<HashMap<i64, Session>>,
    max_messages: usize,
    timeout: Duration,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_limits(MAX_CONTEXT_MESSAGES, SESSION_TIMEOUT)
    }

    /// Store with custom window size and idle timeout.
    pub fn with_limits(max_messages: usize, timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_messages,
            timeout,
        }
    }

    /// The current window for a chat, oldest first. An expired session is
    /// removed here and yields an empty window.
    pub fn history(&self, chat_id: i64) -> Vec<ChatMessage> {
        let mut sessions = self.lock();
        match sessions.entry(chat_id) {
            Entry::Occupied(entry) => {
                if entry.get().last_activity.elapsed() > self.timeout {
                    entry.remove();
                    Vec::new()
                } else {
                    entry.get().messages.clone()
                }
            }
            Entry::Vacant(_) => Vec::new(),
        }
    }

    /// Append a message, creating the session if needed, refreshing its
    /// activity time, and trimming the window to the configured size.
    pub fn append(&self, chat_id: i64, message: ChatMessage) {
        let mut sessions = self.lock();
        let session = sessions.entry(chat_id).or_insert_with(|| Session {
            messages: Vec::new(),
            last_activity: Instant::now(),
        });
        session.messages.push(message);
        session.last_activity = Instant::now();
        if session.messages.len() > self.max_messages {
            let excess = session.messages.len() - self.max_messages;
            session.messages.drain(..excess);
        }
    }

    /// Drop a chat's session. No-op when none exists.
    pub fn clear(&self, chat_id: i64) {
        self.lock().remove(&chat_id);
    }

    /// Number of live sessions, sweeping out expired ones first.
    pub fn active_count(&self) -> usize {
        let mut sessions = self.lock();
        sessions.retain(|_, session| session.last_activity.elapsed() <= self.timeout);
        sessions.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<i64, Session>> {
        // A poisoned lock still holds a coherent map; keep going.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
