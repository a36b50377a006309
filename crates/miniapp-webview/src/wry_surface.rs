//! [`WebSurface`] backed by a child `wry::WebView`.
//!
//! The page is loaded under the [`BUNDLE_SCHEME`] custom protocol rather
//! than from the loopback server directly, so subresources reach the server
//! through the attached [`ResourceLoader`](crate::ResourceLoader) instead
//! of the engine's own TLS stack.

use std::borrow::Cow;
use std::sync::{Arc, Mutex};

use miniapp_common::SurfaceError;
use tracing::{debug, warn};
use url::Url;
use wry::http::header::CONTENT_TYPE;
use wry::http::{HeaderValue, Response, StatusCode};
use wry::raw_window_handle;
use wry::{PageLoadEvent, RequestAsyncResponder, WebView, WebViewBuilder};

use crate::bridge::BRIDGE_INIT_SCRIPT;
use crate::history::NavigationHistory;
use crate::policy::NavigationPolicyGate;
use crate::resources::{
    bundle_document_url, request_path, EntryDocument, Resource, SharedResourceLoader,
    BUNDLE_SCHEME,
};
use crate::surface::{HistoryState, SurfaceEvent, WebSurface};

pub struct WrySurface {
    webview: WebView,
    events: Arc<Mutex<Vec<SurfaceEvent>>>,
    history: Arc<Mutex<NavigationHistory>>,
    entry: Arc<Mutex<EntryDocument>>,
    loader: Arc<Mutex<Option<SharedResourceLoader>>>,
}

impl WrySurface {
    /// Create the web view as a child of `window`, filling `bounds`.
    ///
    /// Every navigation the page attempts is classified by `gate` before
    /// the engine proceeds.
    pub fn create<W: raw_window_handle::HasWindowHandle>(
        window: &W,
        bounds: wry::Rect,
        gate: Arc<NavigationPolicyGate>,
    ) -> Result<Self, SurfaceError> {
        let events: Arc<Mutex<Vec<SurfaceEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let history = Arc::new(Mutex::new(NavigationHistory::new()));
        let entry = Arc::new(Mutex::new(EntryDocument::default()));
        let loader: Arc<Mutex<Option<SharedResourceLoader>>> = Arc::new(Mutex::new(None));

        let ipc_events = Arc::clone(&events);
        let load_events = Arc::clone(&events);
        let load_history = Arc::clone(&history);
        let protocol_entry = Arc::clone(&entry);
        let protocol_loader = Arc::clone(&loader);

        let webview = WebViewBuilder::new()
            .with_bounds(bounds)
            .with_focused(false)
            .with_initialization_script(BRIDGE_INIT_SCRIPT)
            .with_ipc_handler(move |request| {
                let body = request.body().to_string();
                debug!(body_len = body.len(), "script message from page");
                if let Ok(mut evts) = ipc_events.lock() {
                    evts.push(SurfaceEvent::ScriptMessage { body });
                }
            })
            .with_on_page_load_handler(move |event, url| {
                if !matches!(event, PageLoadEvent::Finished) {
                    return;
                }
                if let Ok(mut history) = load_history.lock() {
                    history.commit(&url);
                }
                if let Ok(mut evts) = load_events.lock() {
                    evts.push(SurfaceEvent::NavigationFinished { url });
                }
            })
            .with_navigation_handler(move |url| gate.classify(&url).is_allowed())
            .with_asynchronous_custom_protocol(
                BUNDLE_SCHEME.to_string(),
                move |_wv_id, request, responder| {
                    serve_bundle_request(
                        &request.uri().to_string(),
                        &protocol_entry,
                        &protocol_loader,
                        responder,
                    );
                },
            )
            .build_as_child(window)
            .map_err(|e| SurfaceError::Load(e.to_string()))?;

        Ok(Self {
            webview,
            events,
            history,
            entry,
            loader,
        })
    }

    pub fn set_bounds(&self, bounds: wry::Rect) -> Result<(), SurfaceError> {
        self.webview
            .set_bounds(bounds)
            .map_err(|e| SurfaceError::Load(e.to_string()))
    }
}

fn serve_bundle_request(
    uri: &str,
    entry: &Mutex<EntryDocument>,
    loader: &Mutex<Option<SharedResourceLoader>>,
    responder: RequestAsyncResponder,
) {
    let Some(path) = request_path(uri) else {
        warn!(uri = %uri, "custom protocol: request outside the bundle origin");
        responder.respond(to_response(Resource::status(404)));
        return;
    };

    if let Some(document) = entry.lock().ok().and_then(|entry| entry.answer(&path)) {
        responder.respond(to_response(document));
        return;
    }

    let loader = loader.lock().ok().and_then(|loader| loader.clone());
    match loader {
        Some(loader) => {
            debug!(path = %path, "custom protocol: forwarding to resource loader");
            loader.load(
                &path,
                Box::new(move |resource| responder.respond(to_response(resource))),
            );
        }
        None => {
            warn!(path = %path, "custom protocol: no resource loader attached");
            responder.respond(to_response(Resource::status(503)));
        }
    }
}

fn to_response(resource: Resource) -> Response<Cow<'static, [u8]>> {
    let mut response = Response::new(Cow::from(resource.body));
    *response.status_mut() =
        StatusCode::from_u16(resource.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if let Some(value) = resource
        .content_type
        .and_then(|ct| HeaderValue::from_str(&ct).ok())
    {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

impl WebSurface for WrySurface {
    fn load_document(&mut self, html: &[u8], base_url: &Url) -> Result<(), SurfaceError> {
        let url = bundle_document_url(base_url)
            .ok_or_else(|| SurfaceError::Load(format!("no bundle url for {base_url}")))?;
        if let Ok(mut entry) = self.entry.lock() {
            entry.set(base_url, html);
        }
        debug!(url = %url, "loading entry document under bundle scheme");
        self.webview
            .load_url(url.as_str())
            .map_err(|e| SurfaceError::Load(e.to_string()))
    }

    fn evaluate_script(&mut self, script: &str) -> Result<(), SurfaceError> {
        self.webview
            .evaluate_script(script)
            .map_err(|e| SurfaceError::Script(e.to_string()))
    }

    fn history(&self) -> HistoryState {
        self.history
            .lock()
            .map(|h| h.state())
            .unwrap_or_default()
    }

    fn go_back(&mut self) {
        let started = self.history.lock().map(|mut h| h.begin_back()).unwrap_or(false);
        if started {
            if let Err(e) = self.webview.evaluate_script("history.back();") {
                warn!(error = %e, "back traversal failed");
            }
        }
    }

    fn go_forward(&mut self) {
        let started = self
            .history
            .lock()
            .map(|mut h| h.begin_forward())
            .unwrap_or(false);
        if started {
            if let Err(e) = self.webview.evaluate_script("history.forward();") {
                warn!(error = %e, "forward traversal failed");
            }
        }
    }

    fn drain_events(&mut self) -> Vec<SurfaceEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => Vec::new(),
        }
    }

    fn attach_resource_loader(&mut self, loader: SharedResourceLoader) {
        if let Ok(mut slot) = self.loader.lock() {
            *slot = Some(loader);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_becomes_http_response() {
        let response = to_response(Resource::ok(
            Some("text/css".into()),
            b"body{}".to_vec(),
        ));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/css");
        assert_eq!(response.body().as_ref(), b"body{}");

        let missing = to_response(Resource::status(404));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert!(missing.headers().get(CONTENT_TYPE).is_none());
    }
}
