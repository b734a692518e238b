//! webhook-feed
//!
//! Follows the live request feed of one webhook endpoint and prints every
//! newly arrived request and every connection status change.
//!
//! ```text
//!   store (HTTP) ──bulk list──┐
//!   channel (WebSocket) ──────┼─▶ FeedController ─▶ FeedSnapshot ─▶ stdout
//!   polling fallback ─────────┘
//! ```

use clap::Parser;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use webhook_feed::config::{load_config, validate_config, ConfigError, FeedConfig, LogFormat};
use webhook_feed::lifecycle::wait_for_shutdown;
use webhook_feed::liveness::{ConnectionStatus, FeedSnapshot};
use webhook_feed::model::{EndpointId, RequestId};
use webhook_feed::observability::{init_logging, init_metrics};
use webhook_feed::store::HttpStore;
use webhook_feed::view::FeedBinding;

#[derive(Parser)]
#[command(name = "webhook-feed")]
#[command(about = "Follow the live request feed of a webhook endpoint", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store base URL (overrides `store.base_url`)
    #[arg(short, long)]
    base_url: Option<String>,

    /// Endpoint to follow
    #[arg(short, long)]
    endpoint: String,

    /// Log output format
    #[arg(long, value_parser = ["pretty", "json"])]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FeedConfig::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.store.base_url = base_url;
    }
    match cli.log_format.as_deref() {
        Some("json") => config.observability.log_format = LogFormat::Json,
        Some("pretty") => config.observability.log_format = LogFormat::Pretty,
        _ => {}
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    init_logging(&config.observability)?;
    tracing::info!(
        store = %config.store.base_url,
        endpoint = %cli.endpoint,
        fallback_ms = config.fallback.ceiling_ms,
        poll_ms = config.polling.interval_ms,
        "webhook-feed v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let store = Arc::new(HttpStore::new(&config.store)?);
    let mut binding = FeedBinding::new(store, config);
    binding.select(Some(EndpointId::new(cli.endpoint)))?;
    let mut updates = binding.subscribe().ok_or("feed session did not start")?;

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let mut printed = HashSet::new();
    let mut status = None;
    let mut loaded = false;
    loop {
        tokio::select! {
            signal = &mut shutdown => {
                let signal = signal?;
                tracing::info!(signal, "Shutdown signal received");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                report(&snapshot, &mut printed, &mut status, &mut loaded);
            }
        }
    }

    binding.unmount();
    tracing::info!("Shutdown complete");
    Ok(())
}

fn report(
    snapshot: &FeedSnapshot,
    printed: &mut HashSet<RequestId>,
    status: &mut Option<ConnectionStatus>,
    loaded: &mut bool,
) {
    if *status != Some(snapshot.status) {
        println!("-- {}", snapshot.status);
        *status = Some(snapshot.status);
    }

    if snapshot.loaded && !*loaded {
        *loaded = true;
        println!(
            "-- {} requests loaded for {}",
            snapshot.items.len(),
            snapshot.tag.endpoint
        );
    }

    // Oldest first, so a burst prints in arrival order.
    for record in snapshot.items.iter().rev() {
        if snapshot.is_recently_arrived(record.id) && printed.insert(record.id) {
            println!(
                "[{}] {} {} {}{}",
                record.id,
                record.received_at.format("%H:%M:%S"),
                record.method,
                record.path,
                record
                    .query_string
                    .as_deref()
                    .filter(|q| !q.is_empty())
                    .map(|q| format!("?{}", q))
                    .unwrap_or_default()
            );
        }
    }
}
