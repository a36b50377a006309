//! Page subresources fetched from the loopback server on the engine's
//! behalf, with the same certificate trust as the entry document.

use std::sync::Arc;

use miniapp_common::FetchError;
use miniapp_webview::{Resource, ResourceLoader, ResourceResponder};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::fetch::ContentFetcher;

pub struct BundleResourceLoader {
    fetcher: Arc<ContentFetcher>,
    base_url: Url,
    runtime: Handle,
    cancel: CancellationToken,
}

impl BundleResourceLoader {
    /// Requests resolve against `base_url`; `cancel` abandons all of them.
    pub fn new(
        fetcher: Arc<ContentFetcher>,
        base_url: Url,
        runtime: Handle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            base_url,
            runtime,
            cancel,
        }
    }

    /// `None` unless `path` stays on the server's origin.
    fn resolve(&self, path: &str) -> Option<Url> {
        let url = self.base_url.join(path.trim_start_matches('/')).ok()?;
        (url.origin() == self.base_url.origin()).then_some(url)
    }
}

impl ResourceLoader for BundleResourceLoader {
    fn load(&self, path: &str, respond: ResourceResponder) {
        if self.cancel.is_cancelled() {
            respond(Resource::status(503));
            return;
        }
        let Some(url) = self.resolve(path) else {
            warn!(path = %path, "resource path leaves the bundle origin");
            respond(Resource::status(404));
            return;
        };

        let fetcher = Arc::clone(&self.fetcher);
        let cancel = self.cancel.clone();
        self.runtime.spawn(async move {
            let resource = match fetcher.fetch_resource_until_cancelled(&url, &cancel).await {
                Ok(fetched) => Resource::ok(fetched.content_type, fetched.body),
                Err(e) => {
                    debug!(url = %url, error = %e, "resource fetch failed");
                    Resource::status(status_for(&e))
                }
            };
            respond(resource);
        });
    }
}

fn status_for(error: &FetchError) -> u16 {
    match error {
        FetchError::Status(status) => *status,
        FetchError::InvalidUrl(_) => 400,
        FetchError::Cancelled => 503,
        FetchError::Timeout => 504,
        FetchError::Network(_) | FetchError::Trust(_) => 502,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::trust::TrustNegotiator;

    fn loader(base: &str, cancel: CancellationToken) -> BundleResourceLoader {
        let fetcher =
            ContentFetcher::new(Arc::new(TrustNegotiator::new()), Duration::from_secs(5)).unwrap();
        BundleResourceLoader::new(
            Arc::new(fetcher),
            Url::parse(base).unwrap(),
            Handle::current(),
            cancel,
        )
    }

    async fn load(loader: &BundleResourceLoader, path: &str) -> Resource {
        let (tx, rx) = tokio::sync::oneshot::channel();
        loader.load(
            path,
            Box::new(move |resource| {
                let _ = tx.send(resource);
            }),
        );
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn paths_stay_on_the_server_origin() {
        let loader = loader("https://127.0.0.1:4000/", CancellationToken::new());
        assert_eq!(
            loader.resolve("/v1/app.js").map(String::from),
            Some("https://127.0.0.1:4000/v1/app.js".to_string())
        );
        assert_eq!(loader.resolve("/https://example.com/x.js"), None);
        assert_eq!(load(&loader, "/https://example.com/x.js").await.status, 404);
    }

    #[tokio::test]
    async fn cancelled_loader_answers_unavailable() {
        let cancel = CancellationToken::new();
        let loader = loader("https://127.0.0.1:1/", cancel.clone());
        cancel.cancel();
        assert_eq!(load(&loader, "/v1/app.js").await, Resource::status(503));
    }

    #[test]
    fn fetch_errors_map_to_gateway_statuses() {
        assert_eq!(status_for(&FetchError::Status(404)), 404);
        assert_eq!(status_for(&FetchError::Timeout), 504);
        assert_eq!(status_for(&FetchError::Trust("x".into())), 502);
    }
}
