//! Router and middleware stack for one preview instance.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Security Headers │ ← no-store, nosniff on every response
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← X-Request-Id generated and echoed
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response logging
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │      Trust       │ ← 403 unless session, token or own Referer
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │   HTML Rewrite   │ ← GET *.html answered here
//! └────────┬─────────┘
//!          │
//!          ▼
//!    Static Files      ← everything else, or 404
//! ```
//!
//! There are no named routes: every path is a file lookup under the root.

use axum::Router;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::files;
use crate::middleware::{TrustLayer, apply_security_headers, rewrite_html};
use crate::state::InstanceState;

/// Build the router serving one instance's root directory.
pub fn build_router(state: InstanceState) -> Router {
    let router = Router::new()
        .fallback(files::serve_static)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rewrite_html,
        ))
        .layer(TrustLayer::new(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    apply_security_headers(router).with_state(state)
}
