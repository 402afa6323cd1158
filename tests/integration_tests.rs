//! End-to-end tests against real preview instances.
//!
//! Each test creates a fixture project with `tempfile`, starts an instance on
//! an ephemeral localhost port and drives it with `reqwest`.
//!
//! Run with: `cargo test --test integration_tests`
//!
//! Requests go to `127.0.0.1` rather than `localhost` so the client never
//! tries `::1` first; the server only listens on IPv4.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::time::Duration;

use reqwest::header::{CACHE_CONTROL, COOKIE, REFERER, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde_json::{Value, json};

use preview_server::middleware::{LINK_INTERCEPTOR_SCRIPT, TOKEN_HEADER};
use preview_server::{InstanceConfig, PreviewError, PreviewServer, Secret};

const SECRET: &str = "abc123";

/// A running instance over a throwaway project directory.
struct TestInstance {
    _dir: tempfile::TempDir,
    server: PreviewServer,
    port: u16,
    client: Client,
}

impl TestInstance {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        write_project(dir.path());

        let config = InstanceConfig::new("fixture", dir.path(), Secret::new(SECRET));
        let server = PreviewServer::new(config);
        let port = server.start(0).await.unwrap();

        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            _dir: dir,
            server,
            port,
            client,
        }
    }

    fn addr(&self, path_and_query: &str) -> String {
        format!("http://127.0.0.1:{}{path_and_query}", self.port)
    }

    async fn get(&self, path_and_query: &str) -> Response {
        self.client.get(self.addr(path_and_query)).send().await.unwrap()
    }
}

fn write_project(root: &Path) {
    std::fs::write(
        root.join("index.html"),
        "<html><head><link rel=\"stylesheet\" href=\"style.css\"></head><body>Hi</body></html>",
    )
    .unwrap();
    std::fs::write(root.join("style.css"), "body { margin: 0; }").unwrap();
    std::fs::create_dir(root.join("docs")).unwrap();
    std::fs::write(root.join("docs").join("guide.html"), "<p>Guide</p>").unwrap();
    std::fs::write(root.join(".env"), "DATABASE_URL=postgres://secret").unwrap();
    std::fs::create_dir(root.join(".git")).unwrap();
    std::fs::write(root.join(".git").join("config"), "[remote \"origin\"]").unwrap();
}

fn session_cookie(response: &Response) -> String {
    let header = response.headers()[SET_COOKIE].to_str().unwrap();
    header.split(';').next().unwrap().to_string()
}

// =============================================================================
// Trust
// =============================================================================

#[tokio::test]
async fn test_bootstrap_then_cookie_follow_up() {
    let instance = TestInstance::start().await;

    let first = instance.get("/index.html?token=abc123").await;
    assert_eq!(first.status(), StatusCode::OK);
    let cookie = session_cookie(&first);
    assert!(cookie.starts_with(&format!("preview_session_{}=", instance.port)));

    let first_body = first.text().await.unwrap();
    assert!(first_body.contains("Hi"));
    let script_at = first_body.find(LINK_INTERCEPTOR_SCRIPT).unwrap();
    assert_eq!(first_body.find("</body>").unwrap(), script_at + LINK_INTERCEPTOR_SCRIPT.len());

    let second = instance
        .client
        .get(instance.addr("/index.html"))
        .header(COOKIE, cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.text().await.unwrap(), first_body);
}

#[tokio::test]
async fn test_bootstrap_url_from_instance() {
    let instance = TestInstance::start().await;
    let url = instance.server.url("index.html").unwrap();
    assert_eq!(
        url,
        format!("http://localhost:{}/index.html?token=abc123", instance.port)
    );

    let response = instance
        .client
        .get(url.replacen("localhost", "127.0.0.1", 1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_wrong_token_forbidden() {
    let instance = TestInstance::start().await;
    let response = instance.get("/index.html?token=wrong").await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(SET_COOKIE).is_none());
    assert_eq!(
        response.headers()[CACHE_CONTROL],
        "no-store, no-cache, must-revalidate, proxy-revalidate"
    );
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "Forbidden: Invalid access token" }));
}

#[tokio::test]
async fn test_token_header() {
    let instance = TestInstance::start().await;
    let response = instance
        .client
        .get(instance.addr("/style.css"))
        .header(TOKEN_HEADER, SECRET)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "body { margin: 0; }");
}

#[tokio::test]
async fn test_own_referer_allows_subresource() {
    let instance = TestInstance::start().await;
    let response = instance
        .client
        .get(instance.addr("/style.css"))
        .header(REFERER, format!("http://localhost:{}/index.html", instance.port))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_other_instance_referer_forbidden() {
    let instance = TestInstance::start().await;
    let response = instance
        .client
        .get(instance.addr("/style.css"))
        .header(REFERER, format!("http://localhost:{}/", instance.port.wrapping_add(1)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cookie_does_not_cross_instances() {
    let a = TestInstance::start().await;
    let b = TestInstance::start().await;

    let cookie = session_cookie(&a.get("/index.html?token=abc123").await);
    let response = b
        .client
        .get(b.addr("/index.html"))
        .header(COOKIE, cookie)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// =============================================================================
// Files
// =============================================================================

#[tokio::test]
async fn test_missing_file_not_found() {
    let instance = TestInstance::start().await;
    let response = instance.get("/missing.html?token=abc123").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "error": "File not found" }));
}

#[tokio::test]
async fn test_dotfiles_never_served() {
    let instance = TestInstance::start().await;
    for path in ["/.env?token=abc123", "/.git/config?token=abc123"] {
        let response = instance.get(path).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        assert!(!response.text().await.unwrap().contains("secret"));
    }
}

#[tokio::test]
async fn test_encoded_traversal_not_found() {
    let instance = TestInstance::start().await;
    let response = instance.get("/docs/%2e%2e/%2e%2e/etc/passwd?token=abc123").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_nested_html_without_body_gets_script_appended() {
    let instance = TestInstance::start().await;
    let response = instance.get("/docs/guide.html?token=abc123").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.text().await.unwrap(),
        format!("<p>Guide</p>{LINK_INTERCEPTOR_SCRIPT}")
    );
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_last_accessed_tracks_authorized_requests_only() {
    let instance = TestInstance::start().await;

    instance.get("/index.html").await;
    assert!(instance.server.last_accessed_at().is_none());

    instance.get("/index.html?token=abc123").await;
    assert!(instance.server.last_accessed_at().is_some());
    assert!(instance.server.idle_for().unwrap() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stop_closes_listener() {
    let instance = TestInstance::start().await;
    instance.server.stop().await;

    assert!(!instance.server.is_running());
    assert!(instance.server.url("/").is_none());
    assert!(
        instance
            .client
            .get(instance.addr("/index.html?token=abc123"))
            .send()
            .await
            .is_err()
    );

    // Second stop is a no-op
    instance.server.stop().await;
}

#[tokio::test]
async fn test_restart_wipes_sessions() {
    let instance = TestInstance::start().await;
    let cookie = session_cookie(&instance.get("/index.html?token=abc123").await);
    instance.server.stop().await;

    let port = instance.server.start(instance.port).await.unwrap();
    assert_eq!(port, instance.port);

    // Pooled connections died with the first run
    let client = Client::builder().no_proxy().build().unwrap();
    let response = client
        .get(instance.addr("/index.html"))
        .header(COOKIE, cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(instance.server.last_accessed_at().is_some());

    instance.server.stop().await;
}

#[tokio::test]
async fn test_bind_conflict_between_instances() {
    let first = TestInstance::start().await;

    let dir = tempfile::tempdir().unwrap();
    let second = PreviewServer::new(InstanceConfig::new("other", dir.path(), Secret::new(SECRET)));
    let err = second.start(first.port).await.unwrap_err();

    assert!(matches!(err, PreviewError::Bind { .. }));
    assert!(!second.is_running());
    assert_eq!(first.get("/style.css?token=abc123").await.status(), StatusCode::OK);
}
