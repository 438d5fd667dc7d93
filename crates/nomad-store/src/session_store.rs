use std::time::{Duration, Instant};

use dashmap::DashMap;
use nomad_common::{Message, Role};
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct Session {
    messages: Vec<Message>,
    last_activity: Instant,
    /// History came from the client rather than from turns run here.
    client_restored: bool,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            messages: Vec::new(),
            last_activity: now,
            client_restored: false,
        }
    }

    fn is_idle(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > ttl
    }
}

/// In-memory conversation history keyed by session id.
///
/// Each session sits behind its own map shard lock, so appends to one
/// conversation are atomic and never lose updates even when two requests for
/// the same session race. No lock is held outside these methods.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
    sweep_threshold: usize,
    restore_limit: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, sweep_threshold: usize, restore_limit: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            sweep_threshold,
            restore_limit,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Snapshot of the session's messages; empty when the session is unknown.
    pub fn get_messages(&self, session_id: &str) -> Vec<Message> {
        self.sessions
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    /// Replace the whole history, creating the session if needed.
    pub fn set_messages(&self, session_id: &str, messages: Vec<Message>) {
        let now = Instant::now();
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(now));
        session.messages = messages;
        session.last_activity = now;
    }

    /// Append to the end of the history, creating the session if needed.
    pub fn append_messages(&self, session_id: &str, messages: &[Message]) {
        let now = Instant::now();
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(now));
        session.messages.extend_from_slice(messages);
        session.last_activity = now;
    }

    /// Run `f` against the history while holding the session's lock.
    pub fn update<R>(&self, session_id: &str, f: impl FnOnce(&mut Vec<Message>) -> R) -> R {
        let now = Instant::now();
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(now));
        session.last_activity = now;
        f(&mut session.messages)
    }

    pub fn touch(&self, session_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.last_activity = Instant::now();
        }
    }

    /// Start a turn: drop the history if the session went idle past the TTL,
    /// overwrite `messages[0]` with a fresh system prompt, append the user
    /// message, and return the resulting history.
    pub fn begin_turn(&self, session_id: &str, system_prompt: &str, user: Message) -> Vec<Message> {
        self.begin_turn_at(session_id, system_prompt, user, Instant::now())
    }

    fn begin_turn_at(
        &self,
        session_id: &str,
        system_prompt: &str,
        user: Message,
        now: Instant,
    ) -> Vec<Message> {
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(now));

        if session.is_idle(now, self.ttl) {
            debug!(session_id, "session idle past ttl, starting fresh");
            session.messages.clear();
            session.client_restored = false;
        }

        put_system_prompt(&mut session.messages, system_prompt);
        session.messages.push(user);
        session.last_activity = now;
        session.messages.clone()
    }

    /// Rehydrate a session from history echoed back by the client.
    ///
    /// Only applies when the server has no history for `session_id`. The last
    /// `restore_limit` client messages are accepted verbatim and the system
    /// prompt is placed at position 0 if the client history does not start
    /// with one. Returns whether a restore happened.
    pub fn restore_from_client(
        &self,
        session_id: &str,
        client_messages: &[Message],
        system_prompt: &str,
    ) -> bool {
        if client_messages.is_empty() {
            return false;
        }

        let now = Instant::now();
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(now));

        if !session.messages.is_empty() && !session.is_idle(now, self.ttl) {
            return false;
        }

        let start = client_messages.len().saturating_sub(self.restore_limit);
        let mut restored = client_messages[start..].to_vec();
        if restored.first().map(|m| m.role) != Some(Role::System) {
            restored.insert(0, Message::system(system_prompt));
        }

        info!(
            session_id,
            restored = restored.len(),
            offered = client_messages.len(),
            "restored session from client history"
        );
        session.messages = restored;
        session.last_activity = now;
        session.client_restored = true;
        true
    }

    /// Whether the session's history was rehydrated from client-echoed
    /// messages. Answers produced on such a history are specific to it.
    pub fn is_client_restored(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|s| s.client_restored)
    }

    /// Remove the session. Returns whether it existed; unknown ids are a no-op.
    pub fn reset(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Remove every session idle for longer than the TTL.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut removed = 0usize;
        self.sessions.retain(|_, session| {
            let keep = !session.is_idle(now, self.ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            info!(removed, remaining = self.sessions.len(), "swept idle sessions");
        }
        removed
    }

    /// Sweep only once the live-session count crosses the threshold, keeping
    /// the per-request cost bounded.
    pub fn maybe_sweep(&self) -> usize {
        if self.sessions.len() > self.sweep_threshold {
            self.sweep_expired()
        } else {
            0
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(1800), 100, 20)
    }
}

fn put_system_prompt(messages: &mut Vec<Message>, system_prompt: &str) {
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content = system_prompt.to_string();
        }
        _ => messages.insert(0, Message::system(system_prompt)),
    }
}
