use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streambatch_core::{
    create_transformer, load_config, validate_config, BatchOrchestrator, Transformer,
    TransformerGateway,
};
use streambatch_server::api::create_router;
use streambatch_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Extra time granted to batch runs on shutdown beyond one transform call.
const SHUTDOWN_MARGIN_SECS: u64 = 5;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("STREAMBATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );
    info!("Source root: {:?}", config.source.root_dir);
    info!("Output directory: {:?}", config.sink.output_dir);

    // Create transformer
    let transformer = create_transformer(&config.transformer)
        .context("Failed to create transformer")?;
    transformer
        .validate()
        .await
        .with_context(|| format!("Transformer '{}' is not usable", transformer.name()))?;
    info!(
        backend = transformer.name(),
        timeout_secs = config.transformer.timeout_secs,
        max_concurrent_calls = config.transformer.max_concurrent_calls,
        "Transformer ready"
    );

    tokio::fs::create_dir_all(&config.transformer.scratch_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create scratch directory {:?}",
                config.transformer.scratch_dir
            )
        })?;

    let gateway = TransformerGateway::new(transformer, config.transformer.clone());
    let orchestrator = BatchOrchestrator::new(config.batch.clone(), config.archive.clone(), gateway);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    // A cancelled run finishes its in-flight item before aborting.
    let grace = Duration::from_secs(config.transformer.timeout_secs + SHUTDOWN_MARGIN_SECS);
    let state = Arc::new(AppState::new(config, orchestrator));
    let batches = state.batches().clone();
    let app = create_router(state);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let signalled = batches.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let cancelled = signalled.cancel_all().await;
            info!(cancelled, "Cancelled running batches");
        })
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if batches.shutdown(grace).await {
        info!("All batch runs stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
