//! Vaultwire Client
//!
//! Interactive terminal client for the Vaultwire secure session protocol.

use std::path::PathBuf;

use clap::Parser;

use client::config::Config;
use client::prompt::StdinPrompt;
use client::runner::SessionRunner;
use client::store::FileSessionStore;
use client::transport::TcpTransport;

/// Vaultwire client - encrypted request/response sessions over TCP.
#[derive(Parser, Debug)]
#[command(name = "vaultwire")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server hostname or address (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ignore the stored credential and perform a full handshake
    #[arg(long)]
    fresh: bool,

    /// Forget the stored credential and exit
    #[arg(long)]
    logout: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate()?;

    // Initialize tracing
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.log_level.clone()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = FileSessionStore::new(config.credential_path());
    if cli.logout {
        use client::store::SessionStore;
        store.clear()?;
        println!("Stored credential removed.");
        return Ok(());
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "Vaultwire client starting"
    );

    let host = config.server.host.clone();
    let port = config.server.port;
    let mut runner = SessionRunner::new(
        store,
        StdinPrompt,
        env!("CARGO_PKG_VERSION"),
        config.session.restart_limit,
    );
    runner.run(|| TcpTransport::connect(&host, port), cli.fresh)
}
