//! tm-trainer - Image Classification Training Service
//!
//! Accepts labeled images, trains and publishes a Custom Vision classifier,
//! streams job progress over SSE and answers prediction requests against the
//! most recently published model.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tm_common::events::EventBus;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tm_trainer::config::{CliArgs, ServiceConfig, MODULE_NAME};
use tm_trainer::services::{
    CustomVisionClient, EnhancementAdapter, ImageStore, VisionThumbnailClient,
};
use tm_trainer::{AppState, Providers};

const JOB_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tm_trainer=info,tm_common=info,tower_http=info")),
        )
        .init();

    let args = CliArgs::parse();

    info!("Starting tm-trainer (Image Classification Training) service");
    info!(
        "Version: {} (build {} at {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    // Step 1: Load TOML and merge CLI/ENV over it
    let config_path = tm_common::config::resolve_config_path(args.config.as_deref(), MODULE_NAME);
    let toml_config = tm_common::config::load_toml_config(&config_path)?;
    let config = ServiceConfig::resolve(&args, &toml_config)?;
    info!("Root folder: {}", config.root_folder.display());

    // Step 2: Image folders
    let image_store = ImageStore::new(&config.root_folder);
    image_store.ensure_dirs().await?;

    // Step 3: Open or create database
    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = tm_trainer::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Step 4: External services
    let custom_vision = Arc::new(CustomVisionClient::new(
        &config.training_endpoint,
        config.training_key.clone(),
        config.prediction_key.clone(),
    )?);
    let enhancer: Option<Arc<dyn EnhancementAdapter>> = match &config.vision {
        Some(vision) => {
            info!(endpoint = %vision.endpoint, "Image enhancement enabled");
            Some(Arc::new(VisionThumbnailClient::new(
                &vision.endpoint,
                vision.key.clone(),
            )?))
        }
        None => {
            info!("Image enhancement disabled (no vision endpoint configured)");
            None
        }
    };
    let providers = Providers {
        training: custom_vision.clone(),
        prediction: custom_vision,
        enhancer,
    };

    let event_bus = EventBus::new(100);
    let state = AppState::new(
        db_pool,
        event_bus,
        image_store,
        providers,
        config.orchestrator.clone(),
    );
    let registry = state.training.registry().clone();
    let shutdown_registry = registry.clone();

    let app = tm_trainer::build_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            let cancelled = shutdown_registry.cancel_all().await;
            info!(cancelled, "Shutdown requested, cancelling active training jobs");
        })
        .await?;

    // Let cancelled jobs emit their terminal events before the runtime stops
    if !registry.wait_idle(JOB_SHUTDOWN_GRACE).await {
        warn!(
            active = registry.active_count().await,
            "Training jobs still running at shutdown"
        );
    }
    info!("Shutdown complete");

    Ok(())
}
