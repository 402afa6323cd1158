//! # Preview Server
//!
//! A per-project file server bound to localhost, meant to be embedded in a
//! host application that previews projects inside an iframe.
//!
//! - **Trust**: session cookie, secret token or same-origin Referer
//! - **Rewriting**: served HTML gets a link interceptor that forwards
//!   `target="_blank"` clicks to the parent frame
//! - **Safety**: dotfiles and paths outside the root are never served
//! - **Lifecycle**: start, stop and restart on demand; idle time exposed for
//!   an external reaper
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   PreviewServer (lifecycle)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Middleware (Security Headers → Request ID → Trace)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Trust (SessionStore, Secret)                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  HTML Rewrite → Static Files                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Project root directory                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use preview_server::{InstanceConfig, PreviewServer, Secret};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), preview_server::PreviewError> {
//!     let config = InstanceConfig::new("landing-page", "/srv/landing-page", Secret::generate());
//!     let server = PreviewServer::new(config);
//!
//!     let port = server.start(0).await?;
//!     println!("listening on {port}: {:?}", server.url("/index.html"));
//!
//!     server.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod files;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod secret;
pub mod server;
pub mod session;
pub mod state;
pub mod utils;

// Re-exports for convenience
pub use config::{Config, InstanceConfig};
pub use error::{PreviewError, PreviewResult};
pub use routes::build_router;
pub use secret::Secret;
pub use server::PreviewServer;
pub use session::SessionStore;
pub use state::InstanceState;
