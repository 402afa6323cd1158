//! HTTP middleware for access control, HTML rewriting and response hardening.
//!
//! - **Trust**: session cookie, secret token or same-origin Referer; 403 otherwise
//! - **Rewrite**: link interceptor injected into served HTML documents
//! - **Security headers**: no caching, no content sniffing
//!
//! # Architecture
//!
//! ```text
//! Request → Security Headers → Request ID → Trace → Trust → Rewrite → Static Files
//!                                                     ↓         ↓
//!                                              403 Forbidden   200 text/html
//! ```
//!
//! # Security Considerations
//!
//! - Secret comparison is constant-time and length-independent
//! - Every denial returns the same body, whichever rule failed
//! - Session cookies are `HttpOnly` and named per port

pub mod auth;
pub mod rewrite;
pub mod security;

pub use auth::{
    Grant, RequestContext, SESSION_COOKIE_PREFIX, TOKEN_HEADER, TOKEN_QUERY, TrustLayer,
    TrustPolicy, Verdict, session_cookie_name,
};
pub use rewrite::{LINK_INTERCEPTOR_SCRIPT, OPEN_LINK_MESSAGE_TYPE, inject_link_interceptor, rewrite_html};
pub use security::{SECURITY_HEADERS, apply_security_headers};
