use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::config::SessionConfig;
use crate::domain::session::{Session, SessionId};

#[derive(Debug)]
struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_seen: Instant,
}

/// In-memory session store.
///
/// Map access only holds a shard lock for the duration of the lookup. The session lock is a
/// synchronous mutex taken for a copy or a write-back, so it can never be held across an await.
/// Turns of one conversation run concurrently; each one reads a snapshot and records its own turn
/// when it finishes.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionSlot>,
    max_history_turns: usize,
    idle_ttl: Option<Duration>,
}

impl SessionRegistry {
    pub fn new(max_history_turns: usize, idle_ttl: Option<Duration>) -> Self {
        Self { sessions: DashMap::new(), max_history_turns, idle_ttl }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_history_turns, config.idle_ttl())
    }

    /// Returns the existing session for `id` or creates an empty one.
    pub fn resolve(&self, id: &SessionId) -> Arc<Mutex<Session>> {
        self.resolve_at(id, Instant::now())
    }

    pub fn resolve_at(&self, id: &SessionId, now: Instant) -> Arc<Mutex<Session>> {
        let mut slot = self.sessions.entry(id.as_str().to_string()).or_insert_with(|| {
            debug!(event_name = "gateway.session.created", session_id = %id, "session created");
            SessionSlot {
                session: Arc::new(Mutex::new(Session::new(id.clone(), self.max_history_turns))),
                last_seen: now,
            }
        });
        slot.last_seen = now;
        Arc::clone(&slot.session)
    }

    /// Copy of the session as it is now, created on first use.
    pub fn snapshot(&self, id: &SessionId) -> Session {
        let session = self.resolve(id);
        let snapshot = lock(&session).clone();
        snapshot
    }

    /// Applies `apply` to the stored session under its lock. `apply` must not block.
    pub fn update<R>(&self, id: &SessionId, apply: impl FnOnce(&mut Session) -> R) -> R {
        let session = self.resolve(id);
        let result = apply(&mut lock(&session));
        result
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes sessions idle for longer than the configured ttl. Sessions whose handle is still
    /// held elsewhere are kept regardless of age.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let before = self.sessions.len();
        self.sessions.retain(|_, slot| {
            let in_use = Arc::strong_count(&slot.session) > 1;
            in_use || now.saturating_duration_since(slot.last_seen) < ttl
        });
        before.saturating_sub(self.sessions.len())
    }
}

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
