//! Loopback content server lifecycle.
//!
//! `LocalContentServer` binds a loopback socket, optionally wraps accepted
//! connections in TLS, and serves one bundle version until stopped. State
//! moves `Stopped -> Starting -> Running` on [`LocalContentServer::start`]
//! and back to `Stopped` on [`LocalContentServer::stop`], which is
//! idempotent and also runs on drop.
//!
//! The listener lives in a slot shared with the accept loop, so `stop`
//! closes the socket before it returns rather than when the loop next runs.

use std::future::poll_fn;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use miniapp_common::{AppId, ServerError, VersionId};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::content::BundleProvider;
use crate::service;
use crate::tls::{CertificateFingerprint, CertificateMaterial};

/// Where bundles live and where to bind.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Directory holding `{app_id}/{version_id}` bundle trees.
    pub bundles_dir: PathBuf,
    pub host: IpAddr,
    /// 0 picks an ephemeral port.
    pub port: u16,
}

impl ServerSettings {
    pub fn new(bundles_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundles_dir: bundles_dir.into(),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running {
        port: u16,
        fingerprint: Option<CertificateFingerprint>,
    },
}

/// What a caller needs to talk to a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    pub base_url: Url,
    pub port: u16,
    /// Present when serving over TLS.
    pub certificate: Option<CertificateMaterial>,
}

impl ServerHandle {
    /// `{base}/{version_id}/{relative}`
    pub fn document_url(&self, version_id: &VersionId, relative: &str) -> Option<Url> {
        self.base_url
            .join(&format!("{}/{}", version_id, relative.trim_start_matches('/')))
            .ok()
    }
}

pub struct LocalContentServer {
    settings: ServerSettings,
    runtime: Handle,
    state: ServerState,
    handle: Option<ServerHandle>,
    shutdown: Option<CancellationToken>,
    listener: Option<ListenerSlot>,
    accept_task: Option<JoinHandle<()>>,
}

/// The bound listener, taken out (and so closed) by whoever stops first.
type ListenerSlot = Arc<Mutex<Option<TcpListener>>>;

impl LocalContentServer {
    /// The accept loop and connection tasks run on `runtime`.
    pub fn new(settings: ServerSettings, runtime: Handle) -> Self {
        Self {
            settings,
            runtime,
            state: ServerState::Stopped,
            handle: None,
            shutdown: None,
            listener: None,
            accept_task: None,
        }
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ServerState::Running { .. })
    }

    /// Base URL while running.
    pub fn base_url(&self) -> Option<&Url> {
        self.handle.as_ref().map(|h| &h.base_url)
    }

    pub fn handle(&self) -> Option<&ServerHandle> {
        self.handle.as_ref()
    }

    /// Bind and start serving the `(app_id, version_id)` bundle.
    ///
    /// On failure the server is left `Stopped` with no socket bound. A
    /// missing bundle directory is not an error; requests simply 404.
    pub fn start(
        &mut self,
        app_id: &AppId,
        version_id: &VersionId,
        secure: bool,
    ) -> Result<ServerHandle, ServerError> {
        if let ServerState::Running { port, .. } = self.state {
            return Err(ServerError::AlreadyRunning(port));
        }
        if !app_id.is_path_safe() {
            return Err(ServerError::InvalidIdentifier(app_id.to_string()));
        }
        if !version_id.is_path_safe() {
            return Err(ServerError::InvalidIdentifier(version_id.to_string()));
        }

        self.state = ServerState::Starting;
        match self.bind_and_spawn(app_id, version_id, secure) {
            Ok(handle) => {
                self.state = ServerState::Running {
                    port: handle.port,
                    fingerprint: handle.certificate.as_ref().map(|c| c.fingerprint()),
                };
                self.handle = Some(handle.clone());
                info!(
                    app_id = %app_id,
                    version_id = %version_id,
                    port = handle.port,
                    secure,
                    "local content server running"
                );
                Ok(handle)
            }
            Err(e) => {
                self.state = ServerState::Stopped;
                Err(e)
            }
        }
    }

    fn bind_and_spawn(
        &mut self,
        app_id: &AppId,
        version_id: &VersionId,
        secure: bool,
    ) -> Result<ServerHandle, ServerError> {
        let certificate = if secure {
            Some(CertificateMaterial::process_default()?)
        } else {
            None
        };
        let acceptor = certificate
            .as_ref()
            .map(|c| c.server_config().map(TlsAcceptor::from))
            .transpose()?;

        let addr = SocketAddr::new(self.settings.host, self.settings.port);
        let bind_error = |source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        };

        // Bound with std so `start` stays synchronous; dropping it on any
        // later error closes the socket.
        let std_listener = std::net::TcpListener::bind(addr).map_err(bind_error)?;
        std_listener.set_nonblocking(true).map_err(bind_error)?;
        let port = std_listener.local_addr().map_err(bind_error)?.port();

        let listener = {
            let _guard = self.runtime.enter();
            TcpListener::from_std(std_listener).map_err(bind_error)?
        };

        let scheme = if secure { "https" } else { "http" };
        let host = match self.settings.host {
            IpAddr::V4(ip) => ip.to_string(),
            IpAddr::V6(ip) => format!("[{ip}]"),
        };
        let base_url = Url::parse(&format!("{scheme}://{host}:{port}/"))
            .map_err(|e| ServerError::TrustSetup(format!("invalid base url: {e}")))?;

        let bundle_root = self
            .settings
            .bundles_dir
            .join(app_id.as_str())
            .join(version_id.as_str());
        if !bundle_root.is_dir() {
            warn!(root = %bundle_root.display(), "bundle root missing, all requests will 404");
        }
        let provider = Arc::new(BundleProvider::new(bundle_root, version_id.clone()));

        let listener: ListenerSlot = Arc::new(Mutex::new(Some(listener)));
        let shutdown = CancellationToken::new();
        let task = self.runtime.spawn(accept_loop(
            Arc::clone(&listener),
            acceptor,
            provider,
            shutdown.clone(),
        ));
        self.shutdown = Some(shutdown);
        self.listener = Some(listener);
        self.accept_task = Some(task);

        Ok(ServerHandle {
            base_url,
            port,
            certificate,
        })
    }

    /// Close the listening socket and signal the accept loop and open
    /// connections to stop. Safe to call repeatedly, and on a server that
    /// never started.
    ///
    /// Connection attempts are refused once this returns. In-flight
    /// requests finish gracefully; use [`shutdown`](Self::shutdown) to wait
    /// for the accept loop itself.
    pub fn stop(&mut self) {
        if let Some(token) = self.shutdown.take() {
            token.cancel();
            if let Some(handle) = &self.handle {
                info!(port = handle.port, "local content server stopping");
            }
        }
        if let Some(slot) = self.listener.take() {
            release_listener(&slot);
        }
        self.accept_task = None;
        self.handle = None;
        self.state = ServerState::Stopped;
    }

    /// [`stop`](Self::stop), then wait for the accept loop to exit.
    pub async fn shutdown(&mut self) {
        let task = self.accept_task.take();
        self.stop();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "accept loop ended abnormally");
            }
        }
    }
}

impl Drop for LocalContentServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn release_listener(slot: &Mutex<Option<TcpListener>>) {
    match slot.lock() {
        Ok(mut listener) => drop(listener.take()),
        Err(poisoned) => drop(poisoned.into_inner().take()),
    }
}

/// `None` once the listener has been released.
fn poll_accept(
    slot: &Mutex<Option<TcpListener>>,
    cx: &mut Context<'_>,
) -> Poll<Option<io::Result<(TcpStream, SocketAddr)>>> {
    let Ok(listener) = slot.lock() else {
        return Poll::Ready(None);
    };
    match listener.as_ref() {
        Some(listener) => listener.poll_accept(cx).map(Some),
        None => Poll::Ready(None),
    }
}

async fn accept_loop(
    listener: ListenerSlot,
    acceptor: Option<TlsAcceptor>,
    provider: Arc<BundleProvider>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = poll_fn(|cx| poll_accept(&listener, cx)) => match accepted {
                None => break,
                Some(Ok(_)) if shutdown.is_cancelled() => break,
                Some(Ok((stream, peer))) => {
                    let acceptor = acceptor.clone();
                    let provider = Arc::clone(&provider);
                    let shutdown = shutdown.child_token();
                    tokio::spawn(async move {
                        serve_connection(stream, peer, acceptor, provider, shutdown).await;
                    });
                }
                Some(Err(e)) => {
                    warn!(error = %e, "TCP accept error");
                }
            }
        }
    }
    release_listener(&listener);
    debug!("accept loop stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    acceptor: Option<TlsAcceptor>,
    provider: Arc<BundleProvider>,
    shutdown: CancellationToken,
) {
    match acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls) => drive_http(TokioIo::new(tls), peer, provider, shutdown).await,
            Err(e) => debug!(peer = %peer, error = %e, "TLS handshake failed"),
        },
        None => drive_http(TokioIo::new(stream), peer, provider, shutdown).await,
    }
}

async fn drive_http<I>(
    io: I,
    peer: SocketAddr,
    provider: Arc<BundleProvider>,
    shutdown: CancellationToken,
) where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let service = service_fn(move |request| {
        let provider = Arc::clone(&provider);
        async move { service::handle(&provider, request).await }
    });

    let connection = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(e) = result {
                debug!(peer = %peer, error = %e, "connection error");
            }
        }
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            let _ = connection.as_mut().await;
        }
    }
}

#[cfg(test)]
mod tests;
