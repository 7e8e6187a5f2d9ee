//! s3share -- serves time-limited share links for objects in an S3 bucket.
//!
//! On SIGTERM/SIGINT the server stops accepting connections and drains
//! in-flight requests for at most `server.shutdown_timeout` seconds.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use s3share::clock::{Clock, SystemClock};
use s3share::share::{ShareConfig, ShareService};

/// Command-line arguments for the s3share server.
#[derive(Parser, Debug)]
#[command(
    name = "s3share",
    version,
    about = "Time-limited share links for objects in an S3 bucket"
)]
struct Cli {
    /// Path to a YAML configuration file.  Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = s3share::config::resolve_config(cli.config.as_deref())?;
    s3share::logging::init_tracing(&config.logging, std::io::stdout)?;
    match &cli.config {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No config file given; using defaults and environment"),
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        s3share::metrics::init_metrics()?;
        s3share::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = s3share::storage::connect(&config.storage).await?;
    let cache = s3share::cache::connect(&config.cache, clock.clone()).await?;
    let shares = ShareService::new(storage, cache, clock, ShareConfig::from_config(&config));
    info!(
        "Share engine ready: base_url={} max_age_days={}",
        config.server.base_url, config.share.max_age_days
    );

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(s3share::AppState { config, shares });
    let app = s3share::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("s3share listening on {}", bind_addr);

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let serve = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        })
        .into_future();
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => result?,
        _ = async {
            let _ = stop_rx.wait_for(|stopping| *stopping).await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("In-flight requests still running after {:?}; exiting", shutdown_timeout);
        }
    }

    info!("s3share shut down");
    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
