mod cli;

use std::sync::Arc;
use std::time::Duration;

use miniapp_common::{AppId, MiniAppError, VersionId};
use miniapp_config::MiniAppConfig;
use miniapp_runtime::{ContentFetcher, TrustNegotiator};
use miniapp_server::{LocalContentServer, ServerHandle, ServerSettings};
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

use crate::cli::{BundleArgs, Command};

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let log_directive = args.log_level.as_deref().unwrap_or("miniapp=info");
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                log_directive
                    .parse()
                    .unwrap_or_else(|_| "miniapp=info".parse().unwrap()),
            ),
        )
        .init();

    tracing::debug!("miniapp v{} starting", env!("CARGO_PKG_VERSION"));

    let result = run(args).await;

    if let Err(e) = result {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: cli::Args) -> Result<(), MiniAppError> {
    match args.command {
        Command::Serve(bundle) => serve(load_config(args.config.as_deref(), &bundle)?).await,
        Command::Fetch(bundle) => fetch(load_config(args.config.as_deref(), &bundle)?).await,
    }
}

/// Config file (explicit path, else the default location) with command
/// line overrides applied, then validated.
fn load_config(
    path: Option<&std::path::Path>,
    overrides: &BundleArgs,
) -> Result<MiniAppConfig, MiniAppError> {
    let mut config = match path {
        Some(path) => {
            tracing::info!("Using config override: {}", path.display());
            miniapp_config::load_from_path(path)?
        }
        None => miniapp_config::toml_loader::load_default()?,
    };

    if let Some(bundles) = &overrides.bundles {
        config.server.bundles_dir = bundles.clone();
    }
    if let Some(app) = &overrides.app {
        config.app.app_id = app.clone();
    }
    if let Some(version) = &overrides.version {
        config.app.version_id = version.clone();
    }
    if let Some(host) = overrides.host {
        config.server.host = host;
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
    if overrides.insecure {
        config.server.secure = false;
    }

    miniapp_config::validation::validate(&config)?;
    Ok(config)
}

fn start_server(config: &MiniAppConfig) -> Result<(LocalContentServer, ServerHandle), MiniAppError> {
    let settings = ServerSettings {
        bundles_dir: config.server.bundles_dir.clone(),
        host: config.server.host,
        port: config.server.port,
    };
    let mut server = LocalContentServer::new(settings, Handle::current());
    let handle = server.start(
        &AppId::new(config.app.app_id.as_str()),
        &VersionId::new(config.app.version_id.as_str()),
        config.server.secure,
    )?;
    Ok((server, handle))
}

fn entry_url(config: &MiniAppConfig, handle: &ServerHandle) -> Result<url::Url, MiniAppError> {
    handle
        .document_url(
            &VersionId::new(config.app.version_id.as_str()),
            &config.fetch.entry_document,
        )
        .ok_or_else(|| {
            miniapp_common::FetchError::InvalidUrl(config.fetch.entry_document.clone()).into()
        })
}

async fn serve(config: MiniAppConfig) -> Result<(), MiniAppError> {
    let (mut server, handle) = start_server(&config)?;

    println!("base url:    {}", handle.base_url);
    println!("entry:       {}", entry_url(&config, &handle)?);
    if let Some(certificate) = &handle.certificate {
        println!("fingerprint: {}", certificate.fingerprint());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, shutting down");
    server.shutdown().await;
    Ok(())
}

async fn fetch(config: MiniAppConfig) -> Result<(), MiniAppError> {
    let (mut server, handle) = start_server(&config)?;

    let negotiator = Arc::new(TrustNegotiator::new());
    if let Some(certificate) = &handle.certificate {
        negotiator.trust_local_certificate(certificate.fingerprint());
    }
    let timeout = Duration::from_secs(u64::from(config.fetch.timeout_secs));
    let fetcher = ContentFetcher::new(negotiator, timeout)?;

    let result = fetcher.fetch(&entry_url(&config, &handle)?).await;
    server.shutdown().await;

    let body = result?;
    println!("{}", String::from_utf8_lossy(&body));
    Ok(())
}
