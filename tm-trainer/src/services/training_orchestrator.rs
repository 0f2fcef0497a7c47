//! Training orchestrator
//!
//! Drives one job through
//! `Created → ProjectProvisioned → TagsCreated → ImagesIngested →
//! TrainingStarted → Polling → Published → Completed`, failing to `Failed`
//! from any step. Every run ends with exactly one terminal progress event and
//! one `JobCompleted`/`JobFailed` bus event.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tm_common::events::{EventBus, JobState, ProgressEvent, ServiceEvent};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::batch_ingestion::{BatchIngestionEngine, IngestionSettings};
use super::completion_poller::{CompletionPoller, PollSettings};
use super::enhancement::EnhancementAdapter;
use super::error::ServiceError;
use super::image_store::ImageStore;
use super::job_reference_store::JobReferenceStore;
use super::progress::ProgressSink;
use super::provider::TrainingProvider;
use crate::models::{
    Hyperparameters, JobReference, LabeledImages, NewJobReference, TagBinding, TrainingJob,
};
use crate::utils::{retry_transient, RetryPolicy};

pub const DEFAULT_DOMAIN_NAME: &str = "General";
pub const DEFAULT_PUBLISH_NAME: &str = "myModel";
const PROJECT_NAME_PREFIX: &str = "Image Classification Project";

/// How long a finished job stays queryable in the job registry
pub const DEFAULT_JOB_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Classification domain to create projects in
    pub domain_name: String,
    /// Name iterations are published under
    pub publish_name: String,
    /// Prediction resource the iteration is published to
    pub prediction_resource_id: String,
    pub retry: RetryPolicy,
    pub ingestion: IngestionSettings,
    pub poll: PollSettings,
    /// Time a finished job's registry entry is kept before removal
    pub job_retention: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            domain_name: DEFAULT_DOMAIN_NAME.to_string(),
            publish_name: DEFAULT_PUBLISH_NAME.to_string(),
            prediction_resource_id: String::new(),
            retry: RetryPolicy::default(),
            ingestion: IngestionSettings::default(),
            poll: PollSettings::default(),
            job_retention: DEFAULT_JOB_RETENTION,
        }
    }
}

/// Everything one job run owns
pub struct JobContext {
    pub job: TrainingJob,
    pub cancel: CancellationToken,
    pub progress: ProgressSink,
    /// Latest state, observed by the job registry
    pub state: Arc<watch::Sender<JobState>>,
}

pub struct TrainingOrchestrator {
    provider: Arc<dyn TrainingProvider>,
    ingestion: BatchIngestionEngine,
    poller: CompletionPoller,
    references: JobReferenceStore,
    event_bus: EventBus,
    settings: OrchestratorSettings,
}

impl TrainingOrchestrator {
    pub fn new(
        provider: Arc<dyn TrainingProvider>,
        enhancer: Option<Arc<dyn EnhancementAdapter>>,
        image_store: ImageStore,
        references: JobReferenceStore,
        event_bus: EventBus,
        settings: OrchestratorSettings,
    ) -> Self {
        let ingestion = BatchIngestionEngine::new(
            provider.clone(),
            enhancer,
            image_store,
            settings.ingestion.clone(),
        );
        let poller = CompletionPoller::new(provider.clone(), settings.poll);

        Self {
            provider,
            ingestion,
            poller,
            references,
            event_bus,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Look up the configured domain and create a multiclass project in it
    pub async fn provision_project(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        let provider = &self.provider;
        let domains = retry_transient("list domains", &self.settings.retry, cancel, |_| async move {
            provider.list_domains().await.map_err(ServiceError::from)
        })
        .await?;

        let wanted = self.settings.domain_name.as_str();
        let domain = domains
            .into_iter()
            .find(|d| {
                d.name.eq_ignore_ascii_case(wanted)
                    && (d.kind.is_empty() || d.kind.eq_ignore_ascii_case("Classification"))
            })
            .ok_or_else(|| ServiceError::ProviderRejected {
                status: 404,
                message: format!("classification domain {:?} not offered by provider", wanted),
            })?;

        let domain_id = domain.id.as_str();
        let project = retry_transient("create project", &self.settings.retry, cancel, |_| async move {
            provider
                .create_project(name, domain_id)
                .await
                .map_err(ServiceError::from)
        })
        .await?;

        info!(project_id = %project.id, domain = %domain.name, "Project created");
        Ok(project.id)
    }

    /// Create one tag per class, in class order
    ///
    /// A retried attempt first lists the project's tags and reuses any that
    /// an earlier attempt already created.
    pub async fn create_tags(
        &self,
        project_id: &str,
        classes: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<TagBinding>, ServiceError> {
        let provider = &self.provider;
        retry_transient("create tags", &self.settings.retry, cancel, |attempt| async move {
            let mut existing: HashMap<String, String> = HashMap::new();
            if attempt > 1 {
                for tag in provider.list_tags(project_id).await? {
                    existing.insert(tag.name, tag.id);
                }
                debug!(project_id = %project_id, reused = existing.len(), "Reconciling tags");
            }

            let mut bindings = Vec::with_capacity(classes.len());
            for class in classes {
                let tag_id = match existing.remove(class) {
                    Some(id) => id,
                    None => provider.create_tag(project_id, class).await?.id,
                };
                bindings.push(TagBinding {
                    label: class.clone(),
                    tag_id,
                });
            }
            Ok::<_, ServiceError>(bindings)
        })
        .await
    }

    /// Queue a training iteration over `tags`; returns the iteration id
    pub async fn start_training(
        &self,
        project_id: &str,
        tags: &[TagBinding],
        hyperparameters: &Hyperparameters,
        cancel: &CancellationToken,
    ) -> Result<String, ServiceError> {
        let tag_ids: Vec<String> = tags.iter().map(|t| t.tag_id.clone()).collect();
        let tag_ids = tag_ids.as_slice();
        let provider = &self.provider;

        let iteration = retry_transient("start training", &self.settings.retry, cancel, |_| async move {
            provider
                .train_project(project_id, tag_ids, hyperparameters)
                .await
                .map_err(ServiceError::from)
        })
        .await?;

        Ok(iteration.id)
    }

    /// Publish a completed iteration under the configured name
    pub async fn publish(
        &self,
        project_id: &str,
        iteration_id: &str,
        publish_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ServiceError> {
        let provider = &self.provider;
        let resource_id = self.settings.prediction_resource_id.as_str();

        retry_transient("publish iteration", &self.settings.retry, cancel, |_| async move {
            provider
                .publish_iteration(project_id, iteration_id, publish_name, resource_id)
                .await
                .map_err(ServiceError::from)
        })
        .await
    }

    /// Run the job to a terminal state and return it
    pub async fn run(&self, mut ctx: JobContext, images: LabeledImages) -> TrainingJob {
        let job_id = ctx.job.job_id;
        info!(
            job_id = %job_id,
            classes = ?ctx.job.classes,
            enhance = ctx.job.enhance_images,
            "Starting training job"
        );

        match self.drive(&mut ctx, images).await {
            Ok(reference) => self.complete(&mut ctx, reference),
            Err(err) => self.fail(&mut ctx, err),
        }

        ctx.job
    }

    async fn drive(
        &self,
        ctx: &mut JobContext,
        images: LabeledImages,
    ) -> Result<JobReference, ServiceError> {
        let cancel = ctx.cancel.clone();

        checkpoint(&cancel)?;
        let project_name = format!("{} {}", PROJECT_NAME_PREFIX, ctx.job.job_id);
        let project_id = self.provision_project(&project_name, &cancel).await?;
        self.advance(ctx, JobState::ProjectProvisioned)?;
        ctx.progress.emit(ProgressEvent::ProjectCreated {
            project_id: project_id.clone(),
        });

        checkpoint(&cancel)?;
        let tags = self.create_tags(&project_id, &ctx.job.classes, &cancel).await?;
        self.advance(ctx, JobState::TagsCreated)?;
        ctx.progress.emit(ProgressEvent::TagsCreated {
            labels: tags.iter().map(|t| t.label.clone()).collect(),
        });

        checkpoint(&cancel)?;
        let summary = self
            .ingestion
            .ingest(
                &project_id,
                images,
                &tags,
                ctx.job.enhance_images,
                &ctx.progress,
                &cancel,
            )
            .await?;
        self.advance(ctx, JobState::ImagesIngested)?;
        if summary.enhancement_fallbacks > 0 {
            warn!(
                job_id = %ctx.job.job_id,
                fallbacks = summary.enhancement_fallbacks,
                "Some images were uploaded without enhancement"
            );
        }

        checkpoint(&cancel)?;
        let hyperparameters = ctx.job.hyperparameters;
        let iteration_id = self
            .start_training(&project_id, &tags, &hyperparameters, &cancel)
            .await?;
        self.advance(ctx, JobState::TrainingStarted)?;
        ctx.progress.emit(ProgressEvent::TrainingStarted {
            iteration_id: iteration_id.clone(),
        });

        checkpoint(&cancel)?;
        self.advance(ctx, JobState::Polling)?;
        self.poller
            .wait_for_completion(&project_id, &iteration_id, &ctx.progress, &cancel)
            .await?;

        checkpoint(&cancel)?;
        let publish_name = self.settings.publish_name.clone();
        self.publish(&project_id, &iteration_id, &publish_name, &cancel)
            .await?;
        self.advance(ctx, JobState::Published)?;
        ctx.progress.emit(ProgressEvent::Published {
            publish_name: publish_name.clone(),
        });

        // No cancellation past this point: the model is live
        let reference = self
            .references
            .write(NewJobReference {
                project_id,
                iteration_id,
                published_name: publish_name,
                enhanced: ctx.job.enhance_images,
            })
            .await?;

        Ok(reference)
    }

    fn advance(&self, ctx: &mut JobContext, to: JobState) -> Result<(), ServiceError> {
        let from = ctx.job.transition_to(to)?;
        ctx.state.send_replace(to);

        debug!(job_id = %ctx.job.job_id, from = %from, to = %to, "Job state changed");
        self.event_bus.emit_lossy(ServiceEvent::JobStateChanged {
            job_id: ctx.job.job_id,
            old_state: from,
            new_state: to,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn complete(&self, ctx: &mut JobContext, reference: JobReference) {
        ctx.job.project_id = Some(reference.project_id.clone());
        ctx.job.iteration_id = Some(reference.iteration_id.clone());

        if let Err(err) = self.advance(ctx, JobState::Completed) {
            self.fail(ctx, err);
            return;
        }

        info!(
            job_id = %ctx.job.job_id,
            project_id = %reference.project_id,
            iteration_id = %reference.iteration_id,
            "Training job completed"
        );

        ctx.progress.emit(ProgressEvent::Completed {
            project_id: reference.project_id.clone(),
            iteration_id: reference.iteration_id.clone(),
        });
        self.event_bus.emit_lossy(ServiceEvent::JobCompleted {
            job_id: ctx.job.job_id,
            project_id: reference.project_id,
            iteration_id: reference.iteration_id,
            timestamp: Utc::now(),
        });
    }

    fn fail(&self, ctx: &mut JobContext, err: ServiceError) {
        let message = err.to_string();

        if matches!(err, ServiceError::Cancelled) {
            info!(job_id = %ctx.job.job_id, state = %ctx.job.state, "Training job cancelled");
        } else {
            error!(
                job_id = %ctx.job.job_id,
                state = %ctx.job.state,
                error = %message,
                "Training job failed"
            );
        }

        if !ctx.job.is_terminal() {
            if let Err(e) = self.advance(ctx, JobState::Failed) {
                warn!(job_id = %ctx.job.job_id, state = %ctx.job.state, error = %e, "Could not record Failed state");
                ctx.state.send_replace(JobState::Failed);
            }
        }
        ctx.job.project_id = None;
        ctx.job.iteration_id = None;

        ctx.progress.emit(ProgressEvent::Failed {
            error: message.clone(),
        });
        self.event_bus.emit_lossy(ServiceEvent::JobFailed {
            job_id: ctx.job.job_id,
            error: message,
            timestamp: Utc::now(),
        });
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), ServiceError> {
    if cancel.is_cancelled() {
        return Err(ServiceError::Cancelled);
    }
    Ok(())
}
