use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// miniapp: host and inspect mini-app bundles over the loopback server.
#[derive(Parser, Debug)]
#[command(name = "miniapp", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a bundle until interrupted.
    Serve(BundleArgs),
    /// Serve a bundle, fetch its entry document and print it.
    Fetch(BundleArgs),
}

/// Overrides applied on top of the config file.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct BundleArgs {
    /// Directory holding `{app}/{version}` bundle trees.
    #[arg(long)]
    pub bundles: Option<PathBuf>,

    /// Mini-app identifier.
    #[arg(long)]
    pub app: Option<String>,

    /// Bundle version identifier.
    #[arg(long)]
    pub version: Option<String>,

    /// Loopback address to bind.
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to bind; 0 picks an ephemeral port.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Serve plain HTTP instead of HTTPS.
    #[arg(long)]
    pub insecure: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
