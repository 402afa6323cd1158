//! HTML rewriting middleware.
//!
//! `GET` requests for `*.html` are answered here: the document is read from the
//! instance root and a small click interceptor is injected before it is sent.
//!
//! The injected script looks for the nearest `<a>` around each click. When the
//! anchor has `target="_blank"` and a relative `href` (anything other than an
//! absolute `http:`, `https:`, `mailto:` or `tel:` URI), default navigation is
//! cancelled and the parent frame receives:
//!
//! ```json
//! { "type": "preview:open-link", "href": "<href>", "baseUrl": "<location.href>" }
//! ```
//!
//! # Fallthrough
//!
//! When the file is missing, or the path is refused by the resolver, the
//! request continues to the static responder, which answers 404. Any other
//! read failure is a 500 for this request only.

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::PreviewError;
use crate::files;
use crate::metrics;
use crate::state::InstanceState;

/// Message type posted to the parent frame.
pub const OPEN_LINK_MESSAGE_TYPE: &str = "preview:open-link";

/// Script block injected into every served HTML document.
pub const LINK_INTERCEPTOR_SCRIPT: &str = r#"<script>
(function () {
  document.addEventListener('click', function (event) {
    var origin = event.target;
    var anchor = origin && origin.closest ? origin.closest('a') : null;
    if (!anchor || anchor.getAttribute('target') !== '_blank') {
      return;
    }
    var href = anchor.getAttribute('href');
    if (!href || /^(https?:|mailto:|tel:)/i.test(href)) {
      return;
    }
    event.preventDefault();
    window.parent.postMessage({
      type: 'preview:open-link',
      href: href,
      baseUrl: window.location.href
    }, '*');
  }, true);
})();
</script>"#;

/// Insert [`LINK_INTERCEPTOR_SCRIPT`] into an HTML document.
///
/// The script goes immediately before the first `</body>`, else before the
/// first `</html>`, else at the end. Tag matching ignores ASCII case.
pub fn inject_link_interceptor(html: &str) -> String {
    let index = find_ascii_case_insensitive(html, "</body>")
        .or_else(|| find_ascii_case_insensitive(html, "</html>"))
        .unwrap_or(html.len());

    let (head, tail) = html.split_at(index);
    let mut out = String::with_capacity(html.len() + LINK_INTERCEPTOR_SCRIPT.len());
    out.push_str(head);
    out.push_str(LINK_INTERCEPTOR_SCRIPT);
    out.push_str(tail);
    out
}

/// Byte offset of the first ASCII-case-insensitive match of `needle`.
///
/// ASCII lowercasing keeps byte offsets and char boundaries intact, so the
/// offset is valid in the original string.
fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

/// Middleware serving rewritten HTML for `GET *.html`.
pub async fn rewrite_html(State(state): State<InstanceState>, req: Request, next: Next) -> Response {
    if req.method() != Method::GET || !req.uri().path().ends_with(".html") {
        return next.run(req).await;
    }

    let path = req.uri().path().to_owned();

    let file_path = match files::resolve_file(state.root(), &path).await {
        Ok(file_path) => file_path,
        Err(e) if files::is_not_found(&e) => return next.run(req).await,
        Err(e) => return PreviewError::Io(e).into_response(),
    };

    let bytes = match tokio::fs::read(&file_path).await {
        Ok(bytes) => bytes,
        Err(e) if files::is_not_found(&e) => return next.run(req).await,
        Err(e) => return PreviewError::Io(e).into_response(),
    };

    let document = String::from_utf8_lossy(&bytes);
    let rewritten = inject_link_interceptor(&document);

    debug!(path = %path, size = rewritten.len(), "Serving rewritten HTML");
    metrics::record_file_served("html");

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        )],
        rewritten,
    )
        .into_response()
}
