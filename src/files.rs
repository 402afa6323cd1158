//! Static file responder and request path resolution.
//!
//! # Resolution Pipeline
//!
//! 1. Percent-decode the request path; reject invalid UTF-8 and NUL bytes.
//! 2. Split into segments; reject `..`, drive prefixes and any segment starting
//!    with `.` (dotfiles and dot-directories are never served).
//! 3. Join onto the canonical root and canonicalize (resolves symlinks).
//! 4. Re-verify that the canonical target is still under the root and that no
//!    component below the root starts with `.`.
//!
//! Every refusal surfaces as `io::ErrorKind::NotFound`, so callers treat a
//! refused path exactly like a missing one.
//!
//! Directories are never served and no index document is substituted.

use std::io;
use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::{PreviewError, PreviewResult};
use crate::metrics;
use crate::state::InstanceState;

/// Content type for anything not in the table below.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Turn a raw URL path into a root-relative filesystem path.
///
/// Returns `None` for paths that must never be served: traversal segments,
/// dot-prefixed segments, NUL bytes, undecodable input, or the bare root.
pub fn sanitize_request_path(raw: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    if decoded.contains('\0') {
        return None;
    }

    let mut relative = PathBuf::new();
    for segment in decoded.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment.starts_with('.') || segment.contains('\\') {
            return None;
        }

        // A segment must be exactly one normal component on this platform.
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => relative.push(part),
            _ => return None,
        }
    }

    (!relative.as_os_str().is_empty()).then_some(relative)
}

/// Resolve a request path to a canonical file path under `root`.
///
/// # Errors
///
/// `NotFound` for missing files and for every refused path; other I/O errors
/// (permissions, etc.) are passed through.
pub async fn resolve_file(root: &Path, raw_path: &str) -> io::Result<PathBuf> {
    let relative = sanitize_request_path(raw_path).ok_or_else(refused)?;

    let canonical = tokio::fs::canonicalize(root.join(&relative)).await?;

    let Ok(below_root) = canonical.strip_prefix(root) else {
        debug!(path = raw_path, "Resolved path escapes the root");
        return Err(refused());
    };
    if below_root.components().any(|c| is_dot_component(&c)) {
        debug!(path = raw_path, "Resolved path passes through a dotfile");
        return Err(refused());
    }

    Ok(canonical)
}

/// Whether an I/O error means "nothing servable at this path".
///
/// Directories and non-directory path prefixes count as missing.
pub fn is_not_found(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory | io::ErrorKind::IsADirectory
    )
}

/// Content type for a file, guessed from its extension.
///
/// Textual types (`text/*`, JavaScript, JSON, XML) are labelled UTF-8.
pub fn content_type_for(path: &Path) -> HeaderValue {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let textual = mime.type_() == mime_guess::mime::TEXT
        || matches!(
            mime.subtype().as_str(),
            "javascript" | "json" | "xml"
        );

    let value = if textual && mime.get_param(mime_guess::mime::CHARSET).is_none() {
        format!("{}; charset=utf-8", mime.essence_str())
    } else {
        mime.to_string()
    };
    HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static(FALLBACK_CONTENT_TYPE))
}

/// Fallback handler: serve a file from the instance root, or 404.
///
/// Only `GET` and `HEAD` are served; anything else falls through to 404.
pub async fn serve_static(State(state): State<InstanceState>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    match respond(&state, &method, &path).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn respond(state: &InstanceState, method: &Method, path: &str) -> PreviewResult<Response> {
    if method != Method::GET && method != Method::HEAD {
        return Err(PreviewError::NotFound);
    }

    let file_path = resolve_file(state.root(), path).await.map_err(into_preview_error)?;
    let metadata = tokio::fs::metadata(&file_path)
        .await
        .map_err(into_preview_error)?;
    if !metadata.is_file() {
        debug!(path, "Refusing to serve a directory");
        return Err(PreviewError::NotFound);
    }

    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        let file = tokio::fs::File::open(&file_path)
            .await
            .map_err(into_preview_error)?;
        Body::from_stream(ReaderStream::new(file))
    };

    debug!(path, size = metadata.len(), "Serving static file");
    metrics::record_file_served("static");

    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type_for(&file_path));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
    Ok(response)
}

fn into_preview_error(err: io::Error) -> PreviewError {
    if is_not_found(&err) {
        PreviewError::NotFound
    } else {
        PreviewError::Io(err)
    }
}

fn refused() -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, "path refused")
}

fn is_dot_component(component: &Component<'_>) -> bool {
    match component {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        Component::ParentDir | Component::CurDir => true,
        Component::RootDir | Component::Prefix(_) => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // --- sanitize_request_path ---

    #[test]
    fn test_sanitize_simple_path() {
        assert_eq!(
            sanitize_request_path("/assets/app.js"),
            Some(PathBuf::from("assets").join("app.js"))
        );
    }

    #[test]
    fn test_sanitize_collapses_empty_segments() {
        assert_eq!(
            sanitize_request_path("//a///b.css"),
            Some(PathBuf::from("a").join("b.css"))
        );
    }

    #[test]
    fn test_sanitize_decodes_percent_escapes() {
        assert_eq!(
            sanitize_request_path("/my%20page.html"),
            Some(PathBuf::from("my page.html"))
        );
    }

    #[test]
    fn test_sanitize_rejects_root() {
        assert_eq!(sanitize_request_path("/"), None);
        assert_eq!(sanitize_request_path(""), None);
    }

    #[test]
    fn test_sanitize_rejects_dotfiles() {
        assert_eq!(sanitize_request_path("/.env"), None);
        assert_eq!(sanitize_request_path("/.git/config"), None);
        assert_eq!(sanitize_request_path("/sub/.hidden/file.txt"), None);
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        assert_eq!(sanitize_request_path("/../etc/passwd"), None);
        assert_eq!(sanitize_request_path("/a/../../b"), None);
        assert_eq!(sanitize_request_path("/%2e%2e/secret"), None);
        assert_eq!(sanitize_request_path("/%2E%2E%2Fsecret"), None);
    }

    #[test]
    fn test_sanitize_rejects_backslashes_and_nul() {
        assert_eq!(sanitize_request_path("/a%5C..%5Cb"), None);
        assert_eq!(sanitize_request_path("/a%00.html"), None);
    }

    #[test]
    fn test_sanitize_rejects_invalid_utf8() {
        assert_eq!(sanitize_request_path("/%ff%fe.html"), None);
    }

    // --- content_type_for ---

    #[test]
    fn test_text_types_carry_charset() {
        assert_eq!(content_type_for(Path::new("a.html")), "text/html; charset=utf-8");
        assert_eq!(content_type_for(Path::new("a.CSS")), "text/css; charset=utf-8");
        assert_eq!(content_type_for(Path::new("notes.txt")), "text/plain; charset=utf-8");
        assert!(
            content_type_for(Path::new("app.js"))
                .to_str()
                .unwrap()
                .ends_with("javascript; charset=utf-8")
        );
        assert_eq!(
            content_type_for(Path::new("data.json")),
            "application/json; charset=utf-8"
        );
    }

    #[test]
    fn test_binary_types() {
        assert_eq!(content_type_for(Path::new("a.png")), "image/png");
        assert_eq!(content_type_for(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("module.wasm")), "application/wasm");
        assert_eq!(content_type_for(Path::new("doc.pdf")), "application/pdf");
    }

    #[test]
    fn test_unknown_types_fall_back() {
        assert_eq!(content_type_for(Path::new("a.unknownext")), FALLBACK_CONTENT_TYPE);
        assert_eq!(content_type_for(Path::new("Makefile")), FALLBACK_CONTENT_TYPE);
    }

    // --- resolve_file ---

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::write(root.join("index.html"), "<body>Hi</body>").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();
        std::fs::write(root.join("sub").join("style.css"), "body{}").unwrap();
        std::fs::write(root.join(".env"), "SECRET=1").unwrap();
        (dir, root)
    }

    #[tokio::test]
    async fn test_resolve_existing_file() {
        let (_dir, root) = fixture();
        let path = resolve_file(&root, "/sub/style.css").await.unwrap();
        assert_eq!(path, root.join("sub").join("style.css"));
    }

    #[tokio::test]
    async fn test_resolve_missing_file_is_not_found() {
        let (_dir, root) = fixture();
        let err = resolve_file(&root, "/missing.html").await.unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn test_resolve_dotfile_is_not_found() {
        let (_dir, root) = fixture();
        let err = resolve_file(&root, "/.env").await.unwrap_err();
        assert!(is_not_found(&err));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_symlink_outside_root_is_refused() {
        use std::os::unix::fs::symlink;

        let (_dir, root) = fixture();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        symlink(outside.path().join("secret.txt"), root.join("evil.txt")).unwrap();

        let err = resolve_file(&root, "/evil.txt").await.unwrap_err();
        assert!(is_not_found(&err));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_symlink_into_dotfile_is_refused() {
        use std::os::unix::fs::symlink;

        let (_dir, root) = fixture();
        symlink(root.join(".env"), root.join("env.txt")).unwrap();

        let err = resolve_file(&root, "/env.txt").await.unwrap_err();
        assert!(is_not_found(&err));
    }

    #[tokio::test]
    async fn test_resolve_allows_root_inside_dot_directory() {
        let outer = tempfile::tempdir().unwrap();
        let root = outer.path().join(".projects").join("site");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("page.html"), "ok").unwrap();
        let root = std::fs::canonicalize(root).unwrap();

        let path = resolve_file(&root, "/page.html").await.unwrap();
        assert_eq!(path, root.join("page.html"));
    }
}
