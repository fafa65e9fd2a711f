//! location-server - remote collection for synced field locations.
//!
//! Serves `/api/locations` over HTTP. Without `--data-dir` the collection
//! lives in memory and is lost on restart; devices are unaffected by that
//! because their records stay in their own stores.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use field_capture_sync::config::ServerConfig;
use field_capture_sync::server;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Remote collection for field location records
#[derive(Parser, Debug)]
#[command(name = "location-server")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    server: ServerConfig,

    /// Log filter, e.g. `info` or `field_capture_sync=debug`
    #[arg(long, env = "FIELD_SERVER_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let collection = server::open_collection(&args.server)
        .context("failed to open the location collection")?;

    let listener = tokio::net::TcpListener::bind(args.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.server.bind))?;
    info!(addr = %args.server.bind, "Location server listening");

    server::serve(listener, Arc::new(collection))
        .await
        .context("location server error")?;

    Ok(())
}
