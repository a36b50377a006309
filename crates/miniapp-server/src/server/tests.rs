//! Lifecycle and serving tests against real loopback sockets.

use super::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn bundles() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("shop").join("v1");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("index.html"), "<html>shop v1</html>").unwrap();
    std::fs::write(dir.path().join("shop").join("private.txt"), "nope").unwrap();
    dir
}

fn server_for(dir: &tempfile::TempDir) -> LocalContentServer {
    LocalContentServer::new(ServerSettings::new(dir.path()), Handle::current())
}

async fn raw_request(port: u16, method: &str, path: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await?;
    let request =
        format!("{method} {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}

#[tokio::test]
async fn serves_index_then_refuses_after_shutdown() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();

    let response = raw_request(handle.port, "GET", "/v1/index.html").await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
    assert!(response.contains("<html>shop v1</html>"));
    assert!(response.to_ascii_lowercase().contains("content-type: text/html"));

    server.shutdown().await;
    assert_eq!(server.state(), &ServerState::Stopped);
    assert!(TcpStream::connect(("127.0.0.1", handle.port)).await.is_err());
}

#[tokio::test]
async fn base_url_follows_path_convention() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();

    assert_eq!(
        server.base_url().map(|u| u.as_str().to_string()),
        Some(format!("http://127.0.0.1:{}/", handle.port))
    );
    let url = handle
        .document_url(&VersionId::new("v1"), "index.html")
        .unwrap();
    assert_eq!(url.path(), "/v1/index.html");
    server.shutdown().await;
}

#[tokio::test]
async fn stop_is_idempotent() {
    let dir = bundles();
    let mut never_started = server_for(&dir);
    never_started.stop();
    never_started.stop();
    assert_eq!(never_started.state(), &ServerState::Stopped);

    let mut server = server_for(&dir);
    server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();
    server.stop();
    server.stop();
    server.shutdown().await;
    assert!(!server.is_running());
    assert!(server.base_url().is_none());
}

#[tokio::test]
async fn stop_refuses_connections_before_returning() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();
    let response = raw_request(handle.port, "GET", "/v1/index.html").await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));

    server.stop();

    // No await in between: the accept loop has not run since the stop.
    assert!(std::net::TcpStream::connect(("127.0.0.1", handle.port)).is_err());
    assert!(raw_request(handle.port, "GET", "/v1/index.html").await.is_err());
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();
    let err = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap_err();
    assert!(matches!(err, ServerError::AlreadyRunning(port) if port == handle.port));
    server.shutdown().await;
}

#[tokio::test]
async fn restart_after_stop() {
    let dir = bundles();
    let mut server = server_for(&dir);
    server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();
    server.shutdown().await;
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();
    let response = raw_request(handle.port, "GET", "/v1/index.html").await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK"));
    server.shutdown().await;
}

#[tokio::test]
async fn missing_bundle_root_starts_and_404s() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v9"), false)
        .unwrap();
    let response = raw_request(handle.port, "GET", "/v9/index.html").await.unwrap();
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    server.shutdown().await;
}

#[tokio::test]
async fn traversal_is_not_found() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();
    let response = raw_request(handle.port, "GET", "/v1/%2e%2e/private.txt")
        .await
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
    assert!(!response.contains("nope"));
    server.shutdown().await;
}

#[tokio::test]
async fn head_has_no_body_and_post_is_rejected() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();

    let head = raw_request(handle.port, "HEAD", "/v1/index.html").await.unwrap();
    assert!(head.starts_with("HTTP/1.1 200 OK"));
    assert!(!head.contains("<html>"));

    let post = raw_request(handle.port, "POST", "/v1/index.html").await.unwrap();
    assert!(post.starts_with("HTTP/1.1 405"), "{post}");
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serves_concurrent_requests() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap();

    let requests: Vec<_> = (0..8)
        .map(|_| tokio::spawn(raw_request(handle.port, "GET", "/v1/index.html")))
        .collect();
    for request in requests {
        let response = request.await.unwrap().unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
    }
    server.shutdown().await;
}

#[tokio::test]
async fn invalid_identifiers_are_rejected_before_binding() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let err = server
        .start(&AppId::new(".."), &VersionId::new("v1"), false)
        .unwrap_err();
    assert!(matches!(err, ServerError::InvalidIdentifier(_)));
    let err = server
        .start(&AppId::new("shop"), &VersionId::new("a/b"), false)
        .unwrap_err();
    assert!(matches!(err, ServerError::InvalidIdentifier(_)));
    assert_eq!(server.state(), &ServerState::Stopped);
}

#[tokio::test]
async fn bind_failure_leaves_server_stopped() {
    let dir = bundles();
    let occupied = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = occupied.local_addr().unwrap().port();

    let mut settings = ServerSettings::new(dir.path());
    settings.port = port;
    let mut server = LocalContentServer::new(settings, Handle::current());
    let err = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), false)
        .unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));
    assert_eq!(server.state(), &ServerState::Stopped);
    server.stop();
}

#[tokio::test]
async fn secure_start_exposes_certificate() {
    let dir = bundles();
    let mut server = server_for(&dir);
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), true)
        .unwrap();
    assert_eq!(handle.base_url.scheme(), "https");
    let certificate = handle.certificate.clone().unwrap();
    assert_eq!(
        server.state(),
        &ServerState::Running {
            port: handle.port,
            fingerprint: Some(certificate.fingerprint()),
        }
    );
    server.shutdown().await;
}
