//! Service modules for the training workflow
//!
//! Leaf-first: provider capabilities, image storage, reference store,
//! ingestion, polling, orchestration, prediction, and job submission.

pub mod batch_ingestion;
pub mod completion_poller;
pub mod custom_vision_client;
pub mod enhancement;
pub mod error;
pub mod image_store;
pub mod job_reference_store;
pub mod job_registry;
pub mod prediction_dispatcher;
pub mod progress;
pub mod provider;
pub mod training_orchestrator;
pub mod training_service;

pub use batch_ingestion::{BatchIngestionEngine, IngestionSettings, IngestionSummary, PROVIDER_MAX_BATCH};
pub use completion_poller::{CompletionPoller, PollSettings};
pub use custom_vision_client::CustomVisionClient;
pub use enhancement::{EnhancementAdapter, EnhancementFailurePolicy, VisionThumbnailClient};
pub use error::ServiceError;
pub use image_store::ImageStore;
pub use job_reference_store::JobReferenceStore;
pub use job_registry::JobRegistry;
pub use prediction_dispatcher::PredictionDispatcher;
pub use progress::{ProgressReceiver, ProgressSink};
pub use provider::{
    Domain, ImageEntry, IterationInfo, IterationStatus, Prediction, PredictionProvider,
    ProjectInfo, ProviderError, TagInfo, TrainingProvider,
};
pub use training_orchestrator::{JobContext, OrchestratorSettings, TrainingOrchestrator};
pub use training_service::{JobHandle, TrainingService};
