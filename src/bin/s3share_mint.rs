//! s3share-mint -- mint a share link from the command line.
//!
//! Uses the same configuration, object store, and secret cache as the
//! server, so the printed link is immediately servable by it.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{SecondsFormat, TimeDelta};
use clap::Parser;

use s3share::clock::{Clock, SystemClock};
use s3share::share::{mint_secret, ShareConfig, ShareRequest, ShareService};

#[derive(Parser, Debug)]
#[command(
    name = "s3share-mint",
    version,
    about = "Mint a time-limited share link for an object"
)]
struct Cli {
    /// Object path relative to the bucket, e.g. images/photo.jpg.
    path: String,

    /// Hours until the link expires.
    #[arg(long, default_value_t = 24)]
    hours: u32,

    /// Path to a YAML configuration file.  Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use this secret instead of a random one.
    #[arg(long)]
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.hours == 0 {
        anyhow::bail!("--hours must be at least 1");
    }

    let config = s3share::config::resolve_config(cli.config.as_deref())?;
    // Keep stdout for the link itself.
    s3share::logging::init_tracing(&config.logging, std::io::stderr)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = s3share::storage::connect(&config.storage).await?;
    let cache = s3share::cache::connect(&config.cache, clock.clone()).await?;
    let shares = ShareService::new(storage, cache, clock, ShareConfig::from_config(&config));

    let secret = cli.secret.unwrap_or_else(mint_secret);
    let expires_at = shares.now() + TimeDelta::hours(i64::from(cli.hours));
    let share = shares
        .create_share(&ShareRequest {
            object_path: cli.path,
            secret,
            expires_at,
        })
        .await?;

    println!("Shareable URL: {}", share.url);
    println!(
        "Expires at: {}",
        share
            .expires_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    println!("Max age: {}s", share.max_age.as_secs());
    Ok(())
}
