//! VidGate - Streaming Relay Gateway
//!
//! WebSocket service that receives video fragments from browser recorders and
//! relays each object to a local scratch file and an S3 multipart upload at
//! the same time, then notifies the system-of-record when the client
//! finalizes.

mod config;
mod dto;
mod handlers;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vidrelay_domain::RelayService;
use vidrelay_http::{HttpCatalogClient, OpenAiEnrichmentProvider};
use vidrelay_s3::S3RemoteStore;
use vidrelay_scratch::FsScratchStore;

use crate::config::RelayConfig;

/// The relay wired to its production adapters
pub type Relay = RelayService<FsScratchStore, S3RemoteStore, HttpCatalogClient, OpenAiEnrichmentProvider>;

/// How long shutdown waits for sessions to clean up
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("RELAY_LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting VidGate relay service");

    let config = RelayConfig::from_env()?;

    // Local scratch files
    let scratch = FsScratchStore::new(&config.scratch_dir);
    scratch.ensure_dir().await?;

    // S3 client with path-style addressing for MinIO compatibility
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();
    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    let remote = S3RemoteStore::new(s3_client, config.bucket.clone())
        .with_folder(config.folder.clone())
        .with_public_base_url(config.public_base_url.clone())
        .with_content_type(config.media_type.clone())
        .with_part_size(config.part_size);

    let catalog = HttpCatalogClient::new(&config.catalog_host, config.catalog_timeout)
        .context("failed to build catalog client")?;
    let enrichment = OpenAiEnrichmentProvider::new(config.openai.clone())
        .context("failed to build enrichment provider")?;

    let relay = RelayService::new(scratch, remote, catalog, enrichment, config.session_config());
    let state = AppState {
        relay: Arc::new(relay),
    };

    let app = routes::create_router(state.clone());

    let addr = config.bind_addr();
    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let cancelled = state.relay.shutdown(SHUTDOWN_GRACE).await;
    info!(sessions_cancelled = cancelled, "VidGate stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
