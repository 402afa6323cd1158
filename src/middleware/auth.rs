//! Trust decision middleware.
//!
//! Every request is evaluated fresh against an ordered rule chain. The first
//! rule that grants access wins; if none does, the request is denied.
//!
//! ```text
//! session cookie ──▶ token (header, then query) ──▶ Referer ──▶ 403
//!      │                     │                          │
//!    ALLOW          ALLOW + Set-Cookie               ALLOW
//! ```
//!
//! 1. **Session** - the `preview_session_{port}` cookie names a live
//!    authenticated session.
//! 2. **Token** - the `X-Preview-Token` header, or the `token` query parameter
//!    when the header is absent, matches the instance secret. A new session is
//!    issued and returned in a `Set-Cookie` header.
//! 3. **Referer** - the `Referer` URL's host and port are exactly
//!    `localhost:{bound port}`. This lets documents already served by this
//!    instance load their sub-resources (including nested frames). The grant
//!    is per request and is never recorded as a session.
//!
//! Every allowed request updates the instance's last-access time. Every denial
//! produces the same 403 body, whichever rule was consulted last.
//!
//! # Cookies
//!
//! The cookie name carries the port because browsers share cookies across
//! ports of the same host. Cookies are `HttpOnly`, `SameSite=Lax` (so they
//! travel into nested frames), scoped to `/`, and not `Secure` (plain HTTP on
//! localhost).

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{COOKIE, REFERER, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Request, Response, Uri};
use axum::response::IntoResponse;
use percent_encoding::percent_decode_str;
use tower::{Layer, Service};
use tracing::{debug, warn};
use url::Url;

use crate::error::PreviewError;
use crate::metrics;
use crate::session::SessionStore;
use crate::state::InstanceState;

/// Header carrying the instance secret.
pub const TOKEN_HEADER: &str = "x-preview-token";

/// Query parameter carrying the instance secret.
pub const TOKEN_QUERY: &str = "token";

/// Session cookie name prefix; the bound port is appended.
pub const SESSION_COOKIE_PREFIX: &str = "preview_session_";

/// The only host a trusted Referer may name.
const TRUSTED_REFERER_HOST: &str = "localhost";

/// Session cookie name for an instance bound to `port`.
pub fn session_cookie_name(port: u16) -> String {
    format!("{SESSION_COOKIE_PREFIX}{port}")
}

/// Which rule admitted a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// An authenticated session cookie was presented.
    Session,
    /// A valid secret was presented; `session_id` was just authenticated.
    Token { session_id: String },
    /// The Referer named this instance's own origin.
    Referer,
}

/// Outcome of evaluating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow(Grant),
    Deny,
}

/// Credentials extracted from one request.
///
/// Built synchronously from the request head, so the request itself is not
/// borrowed while the policy awaits the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Value of this instance's session cookie
    pub session_id: Option<String>,
    /// Presented secret, raw bytes (header) or percent-decoded bytes (query)
    pub token: Option<Vec<u8>>,
    /// Raw `Referer` header
    pub referer: Option<String>,
}

impl RequestContext {
    /// Extract credentials from request headers and URI.
    pub fn from_parts(headers: &HeaderMap, uri: &Uri, cookie_name: &str) -> Self {
        Self {
            session_id: extract_cookie(headers, cookie_name),
            token: extract_token(headers, uri),
            referer: headers
                .get(REFERER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
        }
    }
}

/// The ordered session → token → referer rule chain for one instance.
#[derive(Clone)]
pub struct TrustPolicy {
    state: InstanceState,
}

impl TrustPolicy {
    /// Create a policy bound to an instance's running state.
    pub fn new(state: InstanceState) -> Self {
        Self { state }
    }

    /// Name of the session cookie this instance reads and issues.
    pub fn cookie_name(&self) -> String {
        session_cookie_name(self.state.port())
    }

    /// Evaluate a request. Side effects: touches the access clock on ALLOW,
    /// authenticates a fresh session on a token grant.
    pub async fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        let sessions = self.state.sessions();

        if let Some(session_id) = &ctx.session_id
            && sessions.is_authenticated(session_id).await
        {
            self.state.touch();
            return Verdict::Allow(Grant::Session);
        }

        if let Some(token) = &ctx.token
            && self.state.secret().is_valid(token)
        {
            let session_id = SessionStore::new_session_id();
            sessions.mark_authenticated(&session_id).await;
            self.state.touch();
            return Verdict::Allow(Grant::Token { session_id });
        }

        if let Some(referer) = &ctx.referer
            && self.is_own_origin(referer)
        {
            self.state.touch();
            return Verdict::Allow(Grant::Referer);
        }

        Verdict::Deny
    }

    /// Whether `referer` parses as a URL whose authority is exactly
    /// `localhost:{bound port}`. An omitted port means the scheme default.
    fn is_own_origin(&self, referer: &str) -> bool {
        let Ok(url) = Url::parse(referer) else {
            return false;
        };
        url.host_str() == Some(TRUSTED_REFERER_HOST)
            && url.port_or_known_default() == Some(self.state.port())
    }

    /// `Set-Cookie` value for a freshly authenticated session.
    pub fn session_cookie(&self, session_id: &str) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.cookie_name(),
            session_id,
            self.state.sessions().ttl().as_secs()
        )
    }
}

/// Tower layer applying [`TrustPolicy`] to every request.
#[derive(Clone)]
pub struct TrustLayer {
    policy: TrustPolicy,
}

impl TrustLayer {
    /// Create the layer for an instance's running state.
    pub fn new(state: InstanceState) -> Self {
        Self {
            policy: TrustPolicy::new(state),
        }
    }
}

impl<S> Layer<S> for TrustLayer {
    type Service = TrustService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TrustService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Trust decision service wrapper.
#[derive(Clone)]
pub struct TrustService<S> {
    inner: S,
    policy: TrustPolicy,
}

impl<S> Service<Request<Body>> for TrustService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let policy = self.policy.clone();
        let ctx = RequestContext::from_parts(req.headers(), req.uri(), &policy.cookie_name());
        let path = req.uri().path().to_owned();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match policy.evaluate(&ctx).await {
                Verdict::Allow(Grant::Token { session_id }) => {
                    debug!(path = %path, "Access granted by token, session issued");
                    metrics::record_trust_decision("token");

                    let mut response = inner.call(req).await?;
                    if let Ok(cookie) = HeaderValue::from_str(&policy.session_cookie(&session_id)) {
                        response.headers_mut().append(SET_COOKIE, cookie);
                    }
                    Ok(response)
                }
                Verdict::Allow(grant) => {
                    let rule = match grant {
                        Grant::Referer => "referer",
                        _ => "session",
                    };
                    debug!(path = %path, rule, "Access granted");
                    metrics::record_trust_decision(rule);
                    inner.call(req).await
                }
                Verdict::Deny => {
                    warn!(
                        path = %path,
                        had_session = ctx.session_id.is_some(),
                        had_token = ctx.token.is_some(),
                        had_referer = ctx.referer.is_some(),
                        "Access denied"
                    );
                    metrics::record_trust_decision("denied");
                    Ok(PreviewError::AuthDenied.into_response())
                }
            }
        })
    }
}

/// Extract the presented secret.
///
/// Checks in order:
/// 1. `X-Preview-Token` header (raw bytes, no UTF-8 requirement)
/// 2. `token` query parameter (percent-decoded bytes)
///
/// Malformed values are returned as-is and simply fail comparison.
fn extract_token(headers: &HeaderMap, uri: &Uri) -> Option<Vec<u8>> {
    if let Some(value) = headers.get(TOKEN_HEADER) {
        return Some(value.as_bytes().to_vec());
    }

    let query = uri.query()?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        (key == TOKEN_QUERY).then(|| percent_decode_str(value).collect())
    })
}

/// Extract a cookie value by name from all `Cookie` headers.
fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name && !value.is_empty()).then(|| value.to_string())
        })
}
