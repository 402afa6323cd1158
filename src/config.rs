//! Configuration for preview instances and the standalone binary.
//!
//! # Instance Configuration
//!
//! [`InstanceConfig`] is what a host hands to each preview instance: a project
//! id, a root directory and a secret. It is immutable once constructed.
//!
//! # Environment Configuration
//!
//! The `preview-server` binary builds one instance from environment variables
//! (a `.env` file is honored):
//!
//! - `PREVIEW_ROOT`: directory to serve (required)
//! - `PREVIEW_PORT`: port to bind on localhost (default: 5173, 0 = any free port)
//! - `PREVIEW_PROJECT_ID`: project id (default: root directory name)
//! - `PREVIEW_SECRET`: access secret (default: randomly generated)
//! - `SESSION_TTL_SECS`: session cookie lifetime (default: 86400)
//! - `METRICS_PORT`: Prometheus endpoint port (default: 0 = disabled)
//! - `LOG_FORMAT`: `json` for JSON log lines, anything else for text

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PreviewError, PreviewResult};
use crate::secret::Secret;
use crate::session::SESSION_TTL;

/// Minimum length accepted for an externally supplied secret.
pub const MIN_SECRET_LENGTH: usize = 8;

/// Immutable per-instance configuration injected by the host.
#[derive(Debug, Clone)]
pub struct InstanceConfig {
    /// Opaque project identifier, stable for the instance lifetime
    pub project_id: String,
    /// Directory whose contents are served
    pub root_path: PathBuf,
    /// Access secret presented via bootstrap URL or token header
    pub secret: Secret,
    /// How long an authenticated session stays valid
    pub session_ttl: Duration,
}

impl InstanceConfig {
    /// Create an instance configuration with the default session lifetime.
    pub fn new(project_id: impl Into<String>, root_path: impl Into<PathBuf>, secret: Secret) -> Self {
        Self {
            project_id: project_id.into(),
            root_path: root_path.into(),
            secret,
            session_ttl: SESSION_TTL,
        }
    }

    /// Override the session lifetime.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }
}

/// Binary configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Instance
    // =========================================================================
    /// Directory to serve
    pub root_path: PathBuf,

    /// Port to bind on localhost (0 = ephemeral)
    pub port: u16,

    /// Project id; derived from the root directory name when unset
    pub project_id: Option<String>,

    /// Access secret; generated when unset
    pub secret: Option<String>,

    /// Session lifetime
    pub session_ttl: Duration,

    // =========================================================================
    // Observability
    // =========================================================================
    /// Log filter (e.g., "info", "preview_server=debug")
    pub log_level: String,

    /// Emit JSON log lines instead of text
    pub log_json: bool,

    /// Port for Prometheus metrics endpoint (0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `PreviewError::Config` if `PREVIEW_ROOT` is missing or any
    /// value fails to parse or validate.
    pub fn from_env() -> PreviewResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let root_path = env::var("PREVIEW_ROOT")
            .map(PathBuf::from)
            .map_err(|_| PreviewError::Config("PREVIEW_ROOT must be set".to_string()))?;

        let config = Self {
            root_path,
            port: Self::parse_env("PREVIEW_PORT", 5173)?,
            project_id: env::var("PREVIEW_PROJECT_ID").ok().filter(|s| !s.is_empty()),
            secret: env::var("PREVIEW_SECRET").ok().filter(|s| !s.is_empty()),
            session_ttl: Duration::from_secs(Self::parse_env(
                "SESSION_TTL_SECS",
                SESSION_TTL.as_secs(),
            )?),
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    fn validate(&self) -> PreviewResult<()> {
        if !self.root_path.is_dir() {
            return Err(PreviewError::Config(format!(
                "PREVIEW_ROOT ({}) is not a directory",
                self.root_path.display()
            )));
        }

        if self.session_ttl.is_zero() {
            return Err(PreviewError::Config(
                "SESSION_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if let Some(secret) = &self.secret
            && secret.len() < MIN_SECRET_LENGTH
        {
            return Err(PreviewError::Config(format!(
                "PREVIEW_SECRET must be at least {MIN_SECRET_LENGTH} bytes"
            )));
        }

        Ok(())
    }

    /// Build the instance configuration, generating a secret if none was given.
    pub fn instance_config(&self) -> InstanceConfig {
        let secret = self
            .secret
            .as_deref()
            .map(Secret::new)
            .unwrap_or_else(Secret::generate);
        let project_id = self
            .project_id
            .clone()
            .unwrap_or_else(|| project_id_from_root(&self.root_path));

        InstanceConfig::new(project_id, self.root_path.clone(), secret)
            .with_session_ttl(self.session_ttl)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address (localhost only).
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        self.metrics_enabled()
            .then(|| std::net::SocketAddr::from(([127, 0, 0, 1], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> PreviewResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| PreviewError::Config(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }
}

/// Derive a project id from the last component of the root path.
fn project_id_from_root(root: &Path) -> String {
    root.file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("preview")
        .to_string()
}

/// Default configuration for testing and development.
impl Default for Config {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            port: 5173,
            project_id: None,
            secret: None,
            session_ttl: SESSION_TTL,
            log_level: "info".to_string(),
            log_json: false,
            metrics_port: 0,
        }
    }
}
