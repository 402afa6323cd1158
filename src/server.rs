//! Preview instance lifecycle.
//!
//! A [`PreviewServer`] is created by the host for one project and can be
//! started and stopped any number of times. Each run binds its own localhost
//! listener and starts with an empty session store; the last-access time
//! survives restarts so an idle reaper can read it after `stop()`.
//!
//! ```text
//!            start(port) ok
//!   Stopped ─────────────────▶ Running
//!      ▲  │ start(port) err         │
//!      │  └──▶ Stopped (unchanged)  │
//!      └────────── stop() ──────────┘
//! ```

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::InstanceConfig;
use crate::error::{PreviewError, PreviewResult};
use crate::metrics;
use crate::routes::build_router;
use crate::state::{AccessClock, InstanceState};

/// Handles for one run of an instance.
struct RunningInstance {
    port: u16,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

/// One project's preview server.
pub struct PreviewServer {
    config: Arc<InstanceConfig>,
    access: Arc<AccessClock>,
    /// Bound port while running, 0 when stopped. Mirrors `running` so the
    /// synchronous accessors never wait on the lifecycle lock.
    port: AtomicU16,
    running: Mutex<Option<RunningInstance>>,
}

impl PreviewServer {
    /// Create a stopped instance.
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            config: Arc::new(config),
            access: Arc::new(AccessClock::new()),
            port: AtomicU16::new(0),
            running: Mutex::new(None),
        }
    }

    /// Bind `127.0.0.1:port` and start serving. Port 0 picks a free port.
    ///
    /// Returns the bound port.
    ///
    /// # Errors
    ///
    /// - `AlreadyRunning` if the instance is serving; it keeps serving
    /// - `Bind` if the listener cannot be bound; the instance stays stopped
    pub async fn start(&self, port: u16) -> PreviewResult<u16> {
        let mut running = self.running.lock().await;
        if let Some(instance) = running.as_ref() {
            return Err(PreviewError::AlreadyRunning(instance.port));
        }

        let root = self.canonical_root().await;

        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| PreviewError::Bind { port, source })?;
        let bound = listener
            .local_addr()
            .map_err(|source| PreviewError::Bind { port, source })?
            .port();

        let state = InstanceState::new(Arc::clone(&self.config), root, bound, Arc::clone(&self.access));
        let app = build_router(state);

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let signal = shutdown.clone().cancelled_owned();
        let project_id = self.config.project_id.clone();

        tracker.spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
            {
                error!(project_id = %project_id, error = %e, "Preview server error");
            }
        });

        *running = Some(RunningInstance {
            port: bound,
            shutdown,
            tracker,
        });
        self.port.store(bound, Ordering::SeqCst);
        metrics::instance_started();

        info!(
            project_id = %self.config.project_id,
            port = bound,
            root = %self.config.root_path.display(),
            "Preview server started"
        );
        Ok(bound)
    }

    /// Stop serving and wait for the listener to close. No-op when stopped.
    ///
    /// `is_running`, `port` and `url` reflect the stopped state as soon as
    /// this is called, before in-flight requests have drained.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(instance) = running.take() else {
            return;
        };

        self.port.store(0, Ordering::SeqCst);
        instance.shutdown.cancel();
        instance.tracker.close();
        instance.tracker.wait().await;
        metrics::instance_stopped();

        info!(
            project_id = %self.config.project_id,
            port = instance.port,
            "Preview server stopped"
        );
    }

    /// Whether the instance is serving.
    pub fn is_running(&self) -> bool {
        self.port().is_some()
    }

    /// Bound port, or `None` when stopped.
    pub fn port(&self) -> Option<u16> {
        match self.port.load(Ordering::SeqCst) {
            0 => None,
            port => Some(port),
        }
    }

    /// Bootstrap URL for `path`, carrying the secret as the `token` query
    /// parameter. `None` when stopped.
    ///
    /// `path` is normalized to start with `/`.
    pub fn url(&self, path: &str) -> Option<String> {
        let port = self.port()?;
        let separator = if path.starts_with('/') { "" } else { "/" };
        let token = utf8_percent_encode(self.config.secret.expose(), NON_ALPHANUMERIC);
        Some(format!("http://localhost:{port}{separator}{path}?token={token}"))
    }

    /// Time of the last successfully authorized request, across all runs.
    pub fn last_accessed_at(&self) -> Option<DateTime<Utc>> {
        self.access.last_accessed_at()
    }

    /// Time elapsed since the last authorized request, or `None` if the
    /// instance has never been accessed.
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_accessed_at()
            .map(|at| (Utc::now() - at).to_std().unwrap_or_default())
    }

    /// Project identifier.
    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    /// Directory being served, as configured.
    pub fn root_path(&self) -> &Path {
        &self.config.root_path
    }

    async fn canonical_root(&self) -> PathBuf {
        match tokio::fs::canonicalize(&self.config.root_path).await {
            Ok(root) => root,
            Err(e) => {
                warn!(
                    root = %self.config.root_path.display(),
                    error = %e,
                    "Cannot canonicalize root, every request will 404"
                );
                self.config.root_path.clone()
            }
        }
    }
}

impl Drop for PreviewServer {
    fn drop(&mut self) {
        if let Some(instance) = self.running.get_mut().take() {
            instance.shutdown.cancel();
            metrics::instance_stopped();
        }
    }
}
