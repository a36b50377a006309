use super::*;
use std::net::SocketAddr;

use miniapp_common::{AppId, VersionId};
use miniapp_server::{LocalContentServer, ServerHandle, ServerSettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::runtime::Handle;

const TIMEOUT: Duration = Duration::from_secs(10);

fn bundles() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("shop").join("v1");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("index.html"), "<html>shop v1</html>").unwrap();
    dir
}

fn start_secure(dir: &tempfile::TempDir) -> (LocalContentServer, ServerHandle) {
    let mut server = LocalContentServer::new(ServerSettings::new(dir.path()), Handle::current());
    let handle = server
        .start(&AppId::new("shop"), &VersionId::new("v1"), true)
        .unwrap();
    (server, handle)
}

fn entry_url(handle: &ServerHandle) -> Url {
    handle
        .document_url(&VersionId::new("v1"), "index.html")
        .unwrap()
}

/// Plain-HTTP server that demands Basic credentials `expected` (base64).
async fn spawn_auth_server(expected: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = stream.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&chunk[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&request).to_string();
                let authorized = request
                    .lines()
                    .any(|line| line.eq_ignore_ascii_case(&format!("authorization: Basic {expected}")));
                let response = if authorized {
                    "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello"
                } else {
                    "HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"bundles\"\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                };
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

fn auth_space(addr: SocketAddr) -> ProtectionSpace {
    ProtectionSpace {
        host: "127.0.0.1".into(),
        port: addr.port(),
        scheme: "http".into(),
        realm: Some("bundles".into()),
    }
}

// -- TLS --

#[tokio::test]
async fn fetches_from_local_server_with_trusted_fingerprint() {
    let dir = bundles();
    let (_server, handle) = start_secure(&dir);
    let negotiator = Arc::new(TrustNegotiator::new());
    negotiator.trust_local_certificate(handle.certificate.as_ref().unwrap().fingerprint());

    let fetcher = ContentFetcher::new(negotiator, TIMEOUT).unwrap();
    let body = fetcher.fetch(&entry_url(&handle)).await.unwrap();
    assert_eq!(body, b"<html>shop v1</html>");
}

#[tokio::test]
async fn unregistered_local_certificate_is_a_trust_error() {
    let dir = bundles();
    let (_server, handle) = start_secure(&dir);
    let fetcher = ContentFetcher::new(Arc::new(TrustNegotiator::new()), TIMEOUT).unwrap();

    let err = fetcher.fetch(&entry_url(&handle)).await.unwrap_err();
    assert!(matches!(err, FetchError::Trust(_)), "{err:?}");
}

#[tokio::test]
async fn missing_entry_document_is_a_status_error() {
    let dir = bundles();
    let (_server, handle) = start_secure(&dir);
    let negotiator = Arc::new(TrustNegotiator::new());
    negotiator.trust_local_certificate(handle.certificate.as_ref().unwrap().fingerprint());

    let fetcher = ContentFetcher::new(negotiator, TIMEOUT).unwrap();
    let url = handle
        .document_url(&VersionId::new("v1"), "missing.html")
        .unwrap();
    assert_eq!(fetcher.fetch(&url).await, Err(FetchError::Status(404)));
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let fetcher = ContentFetcher::new(Arc::new(TrustNegotiator::new()), TIMEOUT).unwrap();
    let url = Url::parse(&format!("http://127.0.0.1:{port}/v1/index.html")).unwrap();
    let err = fetcher.fetch(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::Network(_)), "{err:?}");
}

#[tokio::test]
async fn cancelled_fetch_reports_cancelled() {
    let fetcher = ContentFetcher::new(Arc::new(TrustNegotiator::new()), TIMEOUT).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let url = Url::parse("https://127.0.0.1:1/v1/index.html").unwrap();
    assert_eq!(
        fetcher.fetch_until_cancelled(&url, &cancel).await,
        Err(FetchError::Cancelled)
    );
}

// -- Credentials --

#[tokio::test]
async fn stored_credential_answers_basic_challenge() {
    // dev:secret
    let addr = spawn_auth_server("ZGV2OnNlY3JldA==").await;
    let negotiator = Arc::new(TrustNegotiator::new());
    negotiator.set_default_credential(
        auth_space(addr),
        Credential::Basic {
            user: "dev".into(),
            password: "secret".into(),
        },
    );

    let fetcher = ContentFetcher::new(negotiator, TIMEOUT).unwrap();
    let url = Url::parse(&format!("http://{addr}/v1/index.html")).unwrap();
    assert_eq!(fetcher.fetch(&url).await.unwrap(), b"hello");
}

#[tokio::test]
async fn challenge_without_credential_surfaces_401() {
    let addr = spawn_auth_server("ZGV2OnNlY3JldA==").await;
    let fetcher = ContentFetcher::new(Arc::new(TrustNegotiator::new()), TIMEOUT).unwrap();
    let url = Url::parse(&format!("http://{addr}/v1/index.html")).unwrap();
    assert_eq!(fetcher.fetch(&url).await, Err(FetchError::Status(401)));
}

#[tokio::test]
async fn rejected_credential_is_not_retried() {
    let addr = spawn_auth_server("ZGV2OnNlY3JldA==").await;
    let negotiator = Arc::new(TrustNegotiator::new());
    negotiator.set_default_credential(
        auth_space(addr),
        Credential::Basic {
            user: "dev".into(),
            password: "wrong".into(),
        },
    );

    let fetcher = ContentFetcher::new(negotiator, TIMEOUT).unwrap();
    let url = Url::parse(&format!("http://{addr}/v1/index.html")).unwrap();
    let err = fetcher.fetch(&url).await.unwrap_err();
    assert!(matches!(err, FetchError::Trust(_)), "{err:?}");
}

// -- Header parsing --

#[test]
fn basic_realm_parsing() {
    assert_eq!(
        basic_realm("Basic realm=\"bundles\""),
        Some(Some("bundles".into()))
    );
    assert_eq!(
        basic_realm("basic charset=\"UTF-8\", realm=\"x\""),
        Some(Some("x".into()))
    );
    assert_eq!(basic_realm("Basic"), Some(None));
    assert_eq!(basic_realm("Bearer realm=\"api\""), None);
}

// -- Error classification --

#[test]
fn tls_error_is_found_through_nested_io_errors() {
    let rejected = rustls::Error::InvalidCertificate(CertificateError::ApplicationVerificationFailure);
    let inner = io::Error::new(io::ErrorKind::InvalidData, rejected.clone());
    let outer = io::Error::other(inner);

    assert_eq!(find_tls_error(&outer), Some(&rejected));
    assert_eq!(find_tls_error(&io::Error::other("connection reset")), None);
}
