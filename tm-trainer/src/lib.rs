//! tm-trainer library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tm_common::events::EventBus;
use tower_http::trace::TraceLayer;

use crate::services::{
    EnhancementAdapter, ImageStore, JobReferenceStore, JobRegistry, OrchestratorSettings,
    PredictionDispatcher, PredictionProvider, TrainingOrchestrator, TrainingProvider,
    TrainingService,
};

/// External services a running instance talks to
#[derive(Clone)]
pub struct Providers {
    pub training: Arc<dyn TrainingProvider>,
    pub prediction: Arc<dyn PredictionProvider>,
    /// `None` when no enhancement service is configured
    pub enhancer: Option<Arc<dyn EnhancementAdapter>>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for the service-wide `/events` stream
    pub event_bus: EventBus,
    pub training: Arc<TrainingService>,
    pub predictions: Arc<PredictionDispatcher>,
    pub references: JobReferenceStore,
    pub image_store: ImageStore,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        image_store: ImageStore,
        providers: Providers,
        settings: OrchestratorSettings,
    ) -> Self {
        let references = JobReferenceStore::new(db.clone());
        let enhancement_available = providers.enhancer.is_some();

        let orchestrator = Arc::new(TrainingOrchestrator::new(
            providers.training,
            providers.enhancer.clone(),
            image_store.clone(),
            references.clone(),
            event_bus.clone(),
            settings,
        ));
        let training = Arc::new(TrainingService::new(
            orchestrator,
            image_store.clone(),
            Arc::new(JobRegistry::new()),
            event_bus.clone(),
            enhancement_available,
        ));
        let predictions = Arc::new(PredictionDispatcher::new(
            providers.prediction,
            providers.enhancer,
            references.clone(),
        ));

        Self {
            db,
            event_bus,
            training,
            predictions,
            references,
            image_store,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::training_routes())
        .merge(api::predict_routes())
        .merge(api::upload_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
