//! Training job submission
//!
//! Validates a request, loads the class images, registers the job and runs
//! it on its own task. Submission returns as soon as the task is spawned.
//! The job stays in the registry for the configured retention after it ends.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tm_common::events::{EventBus, JobState, ProgressEvent, ServiceEvent};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use super::error::ServiceError;
use super::image_store::ImageStore;
use super::job_registry::JobRegistry;
use super::progress::{ProgressReceiver, ProgressSink};
use super::training_orchestrator::{JobContext, TrainingOrchestrator};
use crate::models::{TrainingJob, TrainingRequest};

/// What a client gets back from `submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub state: JobState,
}

pub struct TrainingService {
    orchestrator: Arc<TrainingOrchestrator>,
    image_store: ImageStore,
    registry: Arc<JobRegistry>,
    event_bus: EventBus,
    enhancement_available: bool,
}

impl TrainingService {
    pub fn new(
        orchestrator: Arc<TrainingOrchestrator>,
        image_store: ImageStore,
        registry: Arc<JobRegistry>,
        event_bus: EventBus,
        enhancement_available: bool,
    ) -> Self {
        Self {
            orchestrator,
            image_store,
            registry,
            event_bus,
            enhancement_available,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Validate and schedule a training job
    pub async fn submit(&self, request: TrainingRequest) -> Result<JobHandle, ServiceError> {
        let job = TrainingJob::from_request(request)?;
        if job.enhance_images && !self.enhancement_available {
            return Err(ServiceError::Validation(
                "image enhancement requested but no enhancement provider is configured".into(),
            ));
        }

        let images = self.image_store.load_labeled_images(&job.classes).await?;

        let job_id = job.job_id;
        let cancel = CancellationToken::new();
        let (progress, events) = ProgressSink::channel(job_id);
        let (state_tx, state_rx) = watch::channel(JobState::Created);
        let state_tx = Arc::new(state_tx);

        self.registry
            .register(job_id, cancel.clone(), state_rx, events)
            .await;

        info!(job_id = %job_id, classes = ?job.classes, "Training job submitted");
        self.event_bus.emit_lossy(ServiceEvent::JobSubmitted {
            job_id,
            classes: job.classes.clone(),
            timestamp: Utc::now(),
        });

        let ctx = JobContext {
            job,
            cancel,
            progress: progress.clone(),
            state: state_tx.clone(),
        };
        let orchestrator = self.orchestrator.clone();
        let event_bus = self.event_bus.clone();
        let registry = self.registry.clone();
        let retention = self.orchestrator.settings().job_retention;

        tokio::spawn(async move {
            let run = tokio::spawn(async move { orchestrator.run(ctx, images).await });

            // The run emits its own terminal event unless it panicked
            if let Err(join_err) = run.await {
                let message = format!("internal error: {}", join_err);
                error!(job_id = %job_id, error = %message, "Training job task aborted");

                state_tx.send_replace(JobState::Failed);
                progress.emit(ProgressEvent::Failed {
                    error: message.clone(),
                });
                event_bus.emit_lossy(ServiceEvent::JobFailed {
                    job_id,
                    error: message,
                    timestamp: Utc::now(),
                });
            }

            tokio::time::sleep(retention).await;
            registry.remove(job_id).await;
        });

        Ok(JobHandle {
            job_id,
            state: JobState::Created,
        })
    }

    pub async fn take_events(&self, job_id: Uuid) -> Result<ProgressReceiver, ServiceError> {
        self.registry.take_events(job_id).await
    }

    pub async fn status(&self, job_id: Uuid) -> Result<JobHandle, ServiceError> {
        let state = self.registry.state(job_id).await?;
        Ok(JobHandle { job_id, state })
    }

    pub async fn cancel(&self, job_id: Uuid) -> Result<JobHandle, ServiceError> {
        let state = self.registry.cancel(job_id).await?;
        Ok(JobHandle { job_id, state })
    }
}
