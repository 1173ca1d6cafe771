//! Weather IPFS gateway.
//!
//! Accepts content hashes of telemetry published to IPFS, files them under
//! `/weather/{geohash}/` in the node's MFS and republishes the folder over
//! IPNS.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ingester::config::IngesterConfig;
use ingester::server::{self, ServerState};
use ingestion::{IngestionPipeline, WeatherQuery};
use storage::{ContentStore, IpfsClient, PublishQueue};

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "IPFS weather telemetry gateway")]
struct Args {
    /// Interface to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (overrides LOG_LEVEL)
    #[arg(long)]
    log_level: Option<String>,

    /// Publish workers (overrides CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut config = IngesterConfig::from_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(log_level) = args.log_level {
        config.log_level = log_level;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    config.validate()?;

    // Initialize tracing
    let level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!(
        ipfs_url = %config.ipfs.url,
        root = %config.root_folder,
        concurrency = config.concurrency,
        "Starting weather IPFS gateway"
    );

    let store: Arc<dyn ContentStore> =
        Arc::new(IpfsClient::new(&config.ipfs).context("Failed to create IPFS client")?);

    let queue = PublishQueue::start(store.clone(), config.queue_config());
    let pipeline = IngestionPipeline::new(store.clone(), queue.clone(), config.pipeline_config());
    let query = WeatherQuery::new(store, config.root_folder.clone());

    let state = Arc::new(
        ServerState::new(pipeline, query, queue.clone(), config.request_timeout())
            .with_prometheus(prometheus),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;

    server::start_server(state, addr, shutdown_signal()).await?;

    info!("Draining publish queue");
    queue.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
