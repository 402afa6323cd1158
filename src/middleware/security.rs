//! Security response headers.
//!
//! Applied outermost, so denials and 404s carry them too. Responses are never
//! cached, and content types are never sniffed.
//!
//! `X-Frame-Options` is not set: preview documents are meant to be framed by
//! the host application.

use axum::Router;
use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, EXPIRES, HeaderName, PRAGMA, X_CONTENT_TYPE_OPTIONS, X_XSS_PROTECTION};
use tower_http::set_header::SetResponseHeaderLayer;

/// Headers set on every response, overriding any set by inner layers.
pub const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (
        CACHE_CONTROL,
        "no-store, no-cache, must-revalidate, proxy-revalidate",
    ),
    (PRAGMA, "no-cache"),
    (EXPIRES, "0"),
    (X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (X_XSS_PROTECTION, "1; mode=block"),
];

/// Wrap `router` so every response carries [`SECURITY_HEADERS`].
pub fn apply_security_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SECURITY_HEADERS
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::overriding(
                name,
                HeaderValue::from_static(value),
            ))
        })
}
