//! The composing controller for one hosted mini-app instance.
//!
//! Construction starts the loopback server, registers its certificate with
//! the trust negotiator and kicks off the entry-document fetch on the tokio
//! runtime. Everything that touches the web surface happens in
//! [`MiniAppRuntimeShell::pump`], called by the owner on the rendering
//! thread: engine events are handled first, then queued work (the fetched
//! document, bridge replies) is applied in order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use miniapp_common::{
    default_external_schemes, new_correlation_id, AppId, FetchError, MiniAppError, NavBarVisibility, NavigationAction,
    VersionId,
};
use miniapp_config::MiniAppConfig;
use miniapp_server::{LocalContentServer, ServerSettings, ServerState};
use miniapp_webview::{
    AffordanceKind, AffordanceState, BridgeMessageRouter, BridgeResponder, ExternalOpener,
    MessageHandler, NavigationAffordanceStateMachine, NavigationBarAttachment, NavigationDelegate,
    NavigationPolicyGate, PolicyDecision, RenderQueue, SurfaceCommand, SurfaceEvent, Transition,
    UnhandledExternalOpener, WebSurface,
};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::fetch::ContentFetcher;
use crate::resources::BundleResourceLoader;
use crate::trust::{Challenge, Disposition, TrustNegotiator};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// The navigation affordance the host shows.
#[derive(Clone, Default)]
pub enum AffordanceView {
    /// The built-in bar, modelled by [`DefaultNavigationBar`].
    #[default]
    Default,
    /// A host-supplied view. It places itself and is told the allowed
    /// actions on every transition.
    Custom(Arc<dyn NavigationDelegate>),
}

impl AffordanceView {
    pub fn kind(&self) -> AffordanceKind {
        match self {
            AffordanceView::Default => AffordanceKind::Default,
            AffordanceView::Custom(_) => AffordanceKind::Custom,
        }
    }
}

/// Everything needed to construct a shell.
#[derive(Clone)]
pub struct ShellConfig {
    pub app_id: AppId,
    pub version_id: VersionId,
    pub title: String,
    pub nav_bar_visibility: NavBarVisibility,
    pub external_schemes: Vec<String>,
    pub server: ServerSettings,
    pub secure: bool,
    pub fetch_timeout: Duration,
    pub entry_document: String,
    pub affordance: AffordanceView,
    pub navigation_delegate: Option<Arc<dyn NavigationDelegate>>,
    pub external_opener: Arc<dyn ExternalOpener>,
}

impl ShellConfig {
    pub fn new(app_id: AppId, version_id: VersionId, bundles_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            app_id,
            version_id,
            title: String::new(),
            nav_bar_visibility: NavBarVisibility::Never,
            external_schemes: default_external_schemes(),
            server: ServerSettings::new(bundles_dir),
            secure: true,
            fetch_timeout: Duration::from_secs(30),
            entry_document: "index.html".into(),
            affordance: AffordanceView::Default,
            navigation_delegate: None,
            external_opener: Arc::new(UnhandledExternalOpener),
        }
    }

    pub fn from_config(config: &MiniAppConfig) -> Self {
        let mut shell = Self::new(
            AppId::new(config.app.app_id.clone()),
            VersionId::new(config.app.version_id.clone()),
            config.server.bundles_dir.clone(),
        );
        shell.title = config.app.title.clone();
        shell.nav_bar_visibility = config.navigation.visibility;
        shell.external_schemes = config.navigation.external_schemes.clone();
        shell.server.host = config.server.host;
        shell.server.port = config.server.port;
        shell.secure = config.server.secure;
        shell.fetch_timeout = Duration::from_secs(u64::from(config.fetch.timeout_secs));
        shell.entry_document = config.fetch.entry_document.clone();
        shell
    }

    pub fn with_nav_bar_visibility(mut self, visibility: NavBarVisibility) -> Self {
        self.nav_bar_visibility = visibility;
        self
    }

    pub fn with_custom_affordance(mut self, affordance: Arc<dyn NavigationDelegate>) -> Self {
        self.affordance = AffordanceView::Custom(affordance);
        self
    }

    pub fn with_navigation_delegate(mut self, delegate: Arc<dyn NavigationDelegate>) -> Self {
        self.navigation_delegate = Some(delegate);
        self
    }

    pub fn with_external_opener(mut self, opener: Arc<dyn ExternalOpener>) -> Self {
        self.external_opener = opener;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// A gate for these settings. Engines that need the gate before the
    /// shell exists (to install their navigation callback) build it here.
    pub fn policy_gate(&self) -> Arc<NavigationPolicyGate> {
        Arc::new(NavigationPolicyGate::new(
            &self.external_schemes,
            Arc::clone(&self.external_opener),
        ))
    }
}

/// State of the built-in navigation bar, for the host to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DefaultNavigationBar {
    pub visible: bool,
    pub back_enabled: bool,
    pub forward_enabled: bool,
}

impl DefaultNavigationBar {
    fn apply(&mut self, transition: &Transition) {
        self.visible = transition.attachment.attached;
        match transition.state {
            AffordanceState::Shown(capability) => {
                self.back_enabled = capability.back;
                self.forward_enabled = capability.forward;
            }
            AffordanceState::Hidden => {
                self.back_enabled = false;
                self.forward_enabled = false;
            }
        }
    }
}

// =============================================================================
// SHELL
// =============================================================================

pub struct MiniAppRuntimeShell<S: WebSurface> {
    config: ShellConfig,
    correlation_id: String,
    surface: S,
    server: LocalContentServer,
    entry_url: Url,
    negotiator: Arc<TrustNegotiator>,
    queue: RenderQueue,
    router: BridgeMessageRouter,
    gate: Arc<NavigationPolicyGate>,
    affordance: NavigationAffordanceStateMachine,
    default_bar: Option<DefaultNavigationBar>,
    fetch_cancel: CancellationToken,
    alive: Arc<AtomicBool>,
    torn_down: bool,
}

impl<S: WebSurface> MiniAppRuntimeShell<S> {
    /// Start the server and the entry-document fetch.
    ///
    /// Server and trust setup failures are returned here. A failed fetch is
    /// reported later, by the [`pump`](Self::pump) that would have loaded it.
    pub fn new(
        config: ShellConfig,
        mut surface: S,
        handler: Arc<dyn MessageHandler>,
        runtime: Handle,
    ) -> Result<Self, MiniAppError> {
        let correlation_id = new_correlation_id();
        let mut server = LocalContentServer::new(config.server.clone(), runtime.clone());
        let handle = server.start(&config.app_id, &config.version_id, config.secure)?;

        let negotiator = Arc::new(TrustNegotiator::new());
        if let Some(certificate) = &handle.certificate {
            negotiator.trust_local_certificate(certificate.fingerprint());
        }

        let entry_url = handle
            .document_url(&config.version_id, &config.entry_document)
            .ok_or_else(|| FetchError::InvalidUrl(config.entry_document.clone()))?;
        let fetcher = Arc::new(ContentFetcher::new(
            Arc::clone(&negotiator),
            config.fetch_timeout,
        )?);

        let queue = RenderQueue::new();
        let fetch_cancel = CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));
        surface.attach_resource_loader(Arc::new(BundleResourceLoader::new(
            Arc::clone(&fetcher),
            handle.base_url.clone(),
            runtime.clone(),
            fetch_cancel.clone(),
        )));
        runtime.spawn(load_entry_document(
            fetcher,
            entry_url.clone(),
            queue.clone(),
            fetch_cancel.clone(),
            Arc::clone(&alive),
        ));

        let router = BridgeMessageRouter::new(handler, queue.clone());
        let gate = config.policy_gate();
        let affordance =
            NavigationAffordanceStateMachine::new(config.nav_bar_visibility, config.affordance.kind());
        let default_bar = match config.affordance {
            AffordanceView::Default => Some(DefaultNavigationBar::default()),
            AffordanceView::Custom(_) => None,
        };

        info!(
            shell = %correlation_id,
            app_id = %config.app_id,
            version_id = %config.version_id,
            url = %entry_url,
            "mini-app shell created"
        );

        Ok(Self {
            config,
            correlation_id,
            surface,
            server,
            entry_url,
            negotiator,
            queue,
            router,
            gate,
            affordance,
            default_bar,
            fetch_cancel,
            alive,
            torn_down: false,
        })
    }

    // -- Accessors --

    pub fn app_id(&self) -> &AppId {
        &self.config.app_id
    }

    pub fn version_id(&self) -> &VersionId {
        &self.config.version_id
    }

    pub fn title(&self) -> &str {
        &self.config.title
    }

    pub fn entry_url(&self) -> &Url {
        &self.entry_url
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.server.base_url()
    }

    pub fn server_state(&self) -> &ServerState {
        self.server.state()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn responder(&self) -> BridgeResponder {
        self.router.responder()
    }

    pub fn policy_gate(&self) -> Arc<NavigationPolicyGate> {
        Arc::clone(&self.gate)
    }

    pub fn trust_negotiator(&self) -> Arc<TrustNegotiator> {
        Arc::clone(&self.negotiator)
    }

    pub fn affordance_state(&self) -> AffordanceState {
        self.affordance.state()
    }

    pub fn attachment(&self) -> NavigationBarAttachment {
        self.affordance.attachment()
    }

    /// `None` when a custom affordance is in use.
    pub fn default_navigation_bar(&self) -> Option<&DefaultNavigationBar> {
        self.default_bar.as_ref()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    // -- Rendering context --

    /// Apply engine events and queued work. Call on the rendering thread.
    ///
    /// Every queued command is applied even if one of them fails. Returns
    /// the entry-document fetch failure, once, if it failed, otherwise the
    /// first surface load failure.
    pub fn pump(&mut self) -> Result<(), MiniAppError> {
        if self.torn_down {
            return Ok(());
        }

        for event in self.surface.drain_events() {
            match event {
                SurfaceEvent::NavigationFinished { url } => self.on_navigation_finished(&url),
                SurfaceEvent::ScriptMessage { body } => self.router.receive_raw(&body),
            }
        }

        let mut failure = None;
        let mut load_failure = None;
        for command in self.queue.drain() {
            match command {
                SurfaceCommand::LoadDocument { html, base_url } => {
                    debug!(shell = %self.correlation_id, url = %base_url, bytes = html.len(), "loading entry document");
                    if let Err(e) = self.surface.load_document(&html, &base_url) {
                        error!(shell = %self.correlation_id, url = %base_url, error = %e, "entry document load failed");
                        load_failure.get_or_insert(e);
                    }
                }
                SurfaceCommand::EvaluateScript(script) => {
                    if let Err(e) = self.surface.evaluate_script(&script) {
                        warn!(shell = %self.correlation_id, error = %e, "bridge reply script failed");
                    }
                }
                SurfaceCommand::LoadFailed(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        match (failure, load_failure) {
            (Some(e), _) => Err(e.into()),
            (None, Some(e)) => Err(e.into()),
            (None, None) => Ok(()),
        }
    }

    /// Re-evaluate the navigation affordance after a finished navigation.
    pub fn on_navigation_finished(&mut self, url: &str) {
        if self.torn_down {
            return;
        }
        let transition = self.affordance.on_navigation_finished(self.surface.history());
        debug!(shell = %self.correlation_id, url = %url, actions = ?transition.actions, "navigation finished");

        if let Some(delegate) = &self.config.navigation_delegate {
            delegate.on_capability_changed(&transition.actions);
        }
        // A custom affordance only hears about changes while it is on screen.
        let shown = matches!(transition.state, AffordanceState::Shown(_));
        if let AffordanceView::Custom(custom) = &self.config.affordance {
            let same_object = self
                .config
                .navigation_delegate
                .as_ref()
                .is_some_and(|delegate| Arc::ptr_eq(delegate, custom));
            if shown && !same_object {
                custom.on_capability_changed(&transition.actions);
            }
        }
        if let Some(bar) = &mut self.default_bar {
            bar.apply(&transition);
        }
    }

    /// Navigate in `action`'s direction if history allows. Returns whether
    /// it did.
    pub fn trigger(&mut self, action: NavigationAction) -> bool {
        if self.torn_down {
            return false;
        }
        let history = self.surface.history();
        let available = match action {
            NavigationAction::Back => history.can_go_back,
            NavigationAction::Forward => history.can_go_forward,
        };
        if !available {
            debug!(shell = %self.correlation_id, ?action, "navigation action not available");
            return false;
        }
        match action {
            NavigationAction::Back => self.surface.go_back(),
            NavigationAction::Forward => self.surface.go_forward(),
        }
        true
    }

    /// Policy decision for a navigation the page is about to make.
    pub fn decide_navigation(&self, request_url: &str) -> PolicyDecision {
        self.gate.classify(request_url)
    }

    /// Resolve a TLS or authentication challenge raised by the engine.
    pub fn handle_challenge(&self, challenge: &Challenge) -> Disposition {
        self.negotiator.decide(challenge)
    }

    // -- Teardown --

    /// Stop the server, abandon the fetch and detach the bridge.
    /// Idempotent; also runs on drop.
    pub fn teardown(&mut self) {
        if !self.begin_teardown() {
            return;
        }
        self.server.stop();
    }

    /// [`teardown`](Self::teardown), then wait until the listening socket
    /// is closed.
    pub async fn shutdown(&mut self) {
        self.begin_teardown();
        self.server.shutdown().await;
    }

    fn begin_teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;
        self.alive.store(false, Ordering::Release);
        self.fetch_cancel.cancel();
        self.queue.close();
        self.router.detach();
        info!(shell = %self.correlation_id, app_id = %self.config.app_id, "mini-app shell torn down");
        true
    }
}

impl<S: WebSurface> Drop for MiniAppRuntimeShell<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn load_entry_document(
    fetcher: Arc<ContentFetcher>,
    url: Url,
    queue: RenderQueue,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
) {
    let result = fetcher.fetch_until_cancelled(&url, &cancel).await;

    if !alive.load(Ordering::Acquire) {
        debug!(url = %url, "shell gone, discarding fetch result");
        return;
    }

    let command = match result {
        Ok(html) => SurfaceCommand::LoadDocument {
            html,
            base_url: url.clone(),
        },
        Err(FetchError::Cancelled) => return,
        Err(e) => {
            error!(url = %url, error = %e, "entry document fetch failed");
            SurfaceCommand::LoadFailed(e)
        }
    };
    if !queue.push(command) {
        debug!(url = %url, "render queue closed, discarding fetch result");
    }
}
