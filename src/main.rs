//! Pairlink - Web-exposed device pairing
//!
//! Serves `GET /pair?number=`, links the number to a messaging account through
//! an external conduit driver, and relays the captured credential to the newly
//! linked account.

use anyhow::{Context, Result};
use clap::Parser;
use pairlink_conduit::BridgeConnector;
use pairlink_core::{ConduitOptions, Config, RetryPolicy};
use pairlink_server::{create_router, AppState};
use pairlink_session::{CredentialStore, PairingOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Pairlink - Link a phone number and relay its session credential
#[derive(Parser, Debug)]
#[command(name = "pairlink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server port
    #[arg(short, long, env = "PORT", default_value = "50900")]
    port: u16,

    /// Directory holding per-session credential directories
    /// (default: <data-local-dir>/pairlink/sessions)
    #[arg(short, long, env = "PAIRLINK_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Value of the X-Signature response header
    #[arg(long, env = "PAIRLINK_SIGNATURE")]
    signature: Option<String>,

    /// Prefix of generated session identifiers
    #[arg(long, env = "PAIRLINK_SESSION_PREFIX", default_value = "PAIRLINK")]
    session_prefix: String,

    /// Conduit driver executable
    #[arg(short, long, env = "PAIRLINK_BRIDGE", default_value = "pairlink-driver")]
    bridge: PathBuf,

    /// Extra argument passed to the conduit driver (repeatable)
    #[arg(long = "bridge-arg", allow_hyphen_values = true)]
    bridge_args: Vec<String>,

    /// Reconnect attempts after a transient disconnect
    #[arg(long, env = "PAIRLINK_MAX_RECONNECTS", default_value = "5")]
    max_reconnects: u32,

    /// Seconds to wait for a single conduit request
    #[arg(long, env = "PAIRLINK_REQUEST_TIMEOUT", default_value = "60")]
    request_timeout: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("pairlink").join("sessions"))
        .unwrap_or_else(|| Config::default().storage_root)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    info!("Pairlink v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::new()
        .with_port(args.port)
        .with_storage_root(args.storage_dir.unwrap_or_else(default_storage_root))
        .with_session_prefix(args.session_prefix);
    if let Some(signature) = args.signature {
        config = config.with_signature(signature);
    }
    config = config.with_conduit(ConduitOptions {
        request_timeout: Duration::from_secs(args.request_timeout),
        ..ConduitOptions::default()
    });
    let reconnect = RetryPolicy::fixed(args.max_reconnects, config.policy.reconnect.interval);
    let policy = config.policy.clone().with_reconnect(reconnect);
    config = config.with_policy(policy);

    let store = CredentialStore::with_root(&config.storage_root)
        .await
        .with_context(|| {
            format!(
                "failed to prepare storage root {}",
                config.storage_root.display()
            )
        })?;
    info!("Session storage: {}", store.root().display());

    let connector = BridgeConnector::new(args.bridge).with_args(args.bridge_args);
    info!("Conduit driver: {}", connector.program().display());

    let orchestrator = Arc::new(PairingOrchestrator::new(
        Arc::new(connector),
        store,
        &config,
    ));
    let state = Arc::new(AppState::new(config.clone(), orchestrator));
    let router = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!("");
    info!("  Listening on http://{}", addr);
    info!("  Pair:   GET /pair?number=<digits>");
    info!("  Health: GET /health");
    info!("  Info:   GET /api/info");
    info!("");
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Goodbye!");
    Ok(())
}
