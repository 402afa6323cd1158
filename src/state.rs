//! Shared state for one running preview instance.
//!
//! [`InstanceState`] is cloned into every middleware and handler. It carries
//! the immutable instance configuration, the canonical root directory, the
//! bound port and the session store of the current run.
//!
//! # Thread Safety
//!
//! The session store is an `Arc<RwLock<..>>` and the access clock is a single
//! atomic, so concurrent requests can update both without coordination.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::config::InstanceConfig;
use crate::secret::Secret;
use crate::session::SessionStore;

/// Last successful access, in milliseconds since the Unix epoch.
///
/// Outlives individual runs of an instance so the host can read it after
/// `stop()`. Updates use `fetch_max`, so the value never moves backwards and
/// repeated touches for the same request are harmless.
#[derive(Debug, Default)]
pub struct AccessClock {
    last_millis: AtomicI64,
}

impl AccessClock {
    /// A clock that has never been touched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access at the current time.
    pub fn touch(&self) {
        let now = Utc::now().timestamp_millis();
        self.last_millis.fetch_max(now, Ordering::SeqCst);
    }

    /// Time of the most recent access, or `None` if never accessed.
    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        match self.last_millis.load(Ordering::SeqCst) {
            0 => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }
}

/// Per-run state shared across all requests to one instance.
#[derive(Clone)]
pub struct InstanceState {
    config: Arc<InstanceConfig>,
    root: Arc<PathBuf>,
    port: u16,
    sessions: SessionStore,
    access: Arc<AccessClock>,
}

impl InstanceState {
    /// Create state for a run bound to `port`.
    ///
    /// `root` should be the canonicalized form of `config.root_path`; file
    /// containment checks compare against it. A fresh session store is
    /// created, so every run starts with no authenticated sessions.
    pub fn new(
        config: Arc<InstanceConfig>,
        root: PathBuf,
        port: u16,
        access: Arc<AccessClock>,
    ) -> Self {
        let sessions = SessionStore::new(config.session_ttl);
        Self {
            config,
            root: Arc::new(root),
            port,
            sessions,
            access,
        }
    }

    /// Instance configuration.
    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// Instance secret.
    pub fn secret(&self) -> &Secret {
        &self.config.secret
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Port this run is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Session store of this run.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Record a successful access for idle tracking.
    pub fn touch(&self) {
        self.access.touch();
    }

    /// Time of the most recent successful access.
    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        self.access.last_accessed_at()
    }
}
