//! Bundle resources served to the page through a custom URL scheme.
//!
//! Web engines verify TLS on their own and cannot be told about the
//! loopback server's self-issued certificate. Instead the page is loaded
//! under `miniapp://localhost/...` and every request for that scheme is
//! answered by a [`ResourceLoader`], which reaches the loopback server
//! through a client that does trust it.

use std::sync::Arc;

use url::Url;

/// Scheme the page is loaded under.
pub const BUNDLE_SCHEME: &str = "miniapp";

/// Origin of pages loaded under [`BUNDLE_SCHEME`]. WebView2 rewrites custom
/// schemes onto `http://{scheme}.localhost/`.
#[cfg(windows)]
pub const BUNDLE_ORIGIN: &str = "http://miniapp.localhost";
#[cfg(not(windows))]
pub const BUNDLE_ORIGIN: &str = "miniapp://localhost";

/// Answer to one resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Resource {
    pub fn ok(content_type: Option<String>, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type,
            body,
        }
    }

    /// Bodyless answer with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: Vec::new(),
        }
    }
}

/// Completes one resource request; may be called from any thread.
pub type ResourceResponder = Box<dyn FnOnce(Resource) + Send>;

/// Resolves `miniapp://` request paths on behalf of the page.
///
/// `load` must not block: engines call it on their UI thread. Answer
/// through `respond` once the resource is available.
pub trait ResourceLoader: Send + Sync {
    /// `path` is absolute within the bundle origin, e.g. `/v1/app.js`.
    fn load(&self, path: &str, respond: ResourceResponder);
}

/// Shared handle to the loader a surface forwards requests to.
pub type SharedResourceLoader = Arc<dyn ResourceLoader>;

/// Where a document fetched from `fetched_from` is shown under the bundle
/// scheme. Only the path and query carry over.
pub fn bundle_document_url(fetched_from: &Url) -> Option<Url> {
    let mut url = Url::parse(BUNDLE_ORIGIN).ok()?;
    url.set_path(fetched_from.path());
    url.set_query(fetched_from.query());
    Some(url)
}

/// Path and query of a request the engine made under the bundle scheme.
/// `None` for anything outside [`BUNDLE_ORIGIN`].
pub fn request_path(request_uri: &str) -> Option<String> {
    let url = Url::parse(request_uri).ok()?;
    let origin = Url::parse(BUNDLE_ORIGIN).ok()?;
    if url.scheme() != origin.scheme() || url.host_str() != origin.host_str() {
        return None;
    }
    Some(match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    })
}

/// The entry document, already fetched, answered without a second fetch.
#[derive(Debug, Clone, Default)]
pub struct EntryDocument {
    path: Option<String>,
    html: Vec<u8>,
}

impl EntryDocument {
    /// Remember `html` as the document at `url`'s path.
    pub fn set(&mut self, url: &Url, html: &[u8]) {
        self.path = Some(url.path().to_string());
        self.html = html.to_vec();
    }

    /// The stored document if `path` (query ignored) names it.
    pub fn answer(&self, path: &str) -> Option<Resource> {
        let path = path.split('?').next().unwrap_or(path);
        (self.path.as_deref() == Some(path))
            .then(|| Resource::ok(Some("text/html; charset=utf-8".into()), self.html.clone()))
    }
}
