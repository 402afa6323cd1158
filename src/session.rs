//! In-memory session store for authenticated preview clients.
//!
//! A session is created the first time a client presents a valid secret. The
//! client then carries the session id in a cookie, and later requests are
//! admitted without re-presenting the secret.
//!
//! # Invariants
//!
//! - A session id only ever moves from unauthenticated to authenticated.
//!   Marking an id twice keeps the original issue time.
//! - Entries expire `ttl` after issue; expired entries read as unauthenticated
//!   and are pruned on the next write.
//! - The store belongs to one running instance and is never persisted, so a
//!   restart starts from an empty store.
//! - At most `max_sessions` entries are kept. Every token request without a
//!   cookie issues a new session, so a client that never stores cookies would
//!   otherwise grow the map for a whole TTL. When full, the oldest session is
//!   evicted and its holder must present the secret again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

/// Session validity window (24 hours).
pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default cap on live sessions per instance.
pub const MAX_SESSIONS: usize = 1024;

/// Thread-safe, clonable session store scoped to a single instance.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Instant>>>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    /// Create an empty store whose sessions live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            max_sessions: MAX_SESSIONS,
        }
    }

    /// Override the session cap (minimum 1).
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    /// Generate a fresh, unguessable session id.
    pub fn new_session_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Session lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether `session_id` names a live authenticated session.
    pub async fn is_authenticated(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .is_some_and(|issued| issued.elapsed() < self.ttl)
    }

    /// Record `session_id` as authenticated.
    ///
    /// Idempotent: an already live session keeps its original issue time.
    /// Evicts the oldest session when the store is full.
    pub async fn mark_authenticated(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        let ttl = self.ttl;
        sessions.retain(|_, issued| issued.elapsed() < ttl);

        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, issued)| **issued)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                debug!("Session store full, evicted oldest session");
            }
        }

        sessions
            .entry(session_id.to_string())
            .or_insert_with(Instant::now);
        trace!(live_sessions = sessions.len(), "Session marked authenticated");
    }

    /// Drop expired sessions, returning how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, issued| issued.elapsed() < ttl);
        before - sessions.len()
    }

    /// Number of stored sessions (live or not yet pruned).
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store holds no sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}
