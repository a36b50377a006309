//! The web engine as an opaque capability.

use miniapp_common::SurfaceError;
use url::Url;

use crate::resources::SharedResourceLoader;

/// Back/forward availability as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistoryState {
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

/// Things the engine reports back to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// A navigation committed and finished loading.
    NavigationFinished { url: String },
    /// Page script posted a bridge message.
    ScriptMessage { body: String },
}

/// What the runtime needs from a web-rendering engine.
///
/// Implementations are driven from one thread only; nothing here is
/// required to be `Send`. Navigation decisions are not part of this trait:
/// engines consult a [`NavigationPolicyGate`](crate::NavigationPolicyGate)
/// synchronously from their own decision callback.
pub trait WebSurface {
    /// Render `html` as if it had been loaded from `base_url`.
    fn load_document(&mut self, html: &[u8], base_url: &Url) -> Result<(), SurfaceError>;

    fn evaluate_script(&mut self, script: &str) -> Result<(), SurfaceError>;

    fn history(&self) -> HistoryState;

    fn go_back(&mut self);

    fn go_forward(&mut self);

    /// Take the events accumulated since the last call.
    fn drain_events(&mut self) -> Vec<SurfaceEvent>;

    /// Where bundle subresource requests go. Engines that load the page
    /// straight from the loopback server can ignore this.
    fn attach_resource_loader(&mut self, _loader: SharedResourceLoader) {}
}
