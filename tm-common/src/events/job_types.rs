//! Training job type definitions
//!
//! Lifecycle state and per-job progress events shared between the trainer
//! service and anything that renders its progress.

use serde::{Deserialize, Serialize};

/// Training job lifecycle state
///
/// `Created → ProjectProvisioned → TagsCreated → ImagesIngested →
/// TrainingStarted → Polling → Published → Completed`, with `Failed`
/// reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    ProjectProvisioned,
    TagsCreated,
    ImagesIngested,
    TrainingStarted,
    Polling,
    Published,
    Completed,
    Failed,
}

impl JobState {
    /// Completed and Failed are terminal; nothing follows them
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// The state that follows `self` on the success path
    pub fn next(self) -> Option<JobState> {
        match self {
            JobState::Created => Some(JobState::ProjectProvisioned),
            JobState::ProjectProvisioned => Some(JobState::TagsCreated),
            JobState::TagsCreated => Some(JobState::ImagesIngested),
            JobState::ImagesIngested => Some(JobState::TrainingStarted),
            JobState::TrainingStarted => Some(JobState::Polling),
            JobState::Polling => Some(JobState::Published),
            JobState::Published => Some(JobState::Completed),
            JobState::Completed | JobState::Failed => None,
        }
    }

    /// Whether `self → to` is a legal transition
    pub fn can_transition_to(self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == JobState::Failed || self.next() == Some(to)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Created => "CREATED",
            JobState::ProjectProvisioned => "PROJECT_PROVISIONED",
            JobState::TagsCreated => "TAGS_CREATED",
            JobState::ImagesIngested => "IMAGES_INGESTED",
            JobState::TrainingStarted => "TRAINING_STARTED",
            JobState::Polling => "POLLING",
            JobState::Published => "PUBLISHED",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One item of a job's progress stream
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ProjectCreated { project_id: String },
    TagsCreated { labels: Vec<String> },
    LabelProcessing { label: String, image_count: usize },
    BatchUploaded { uploaded: usize, total: usize },
    TrainingStarted { iteration_id: String },
    TrainingStatus { status: String },
    Published { publish_name: String },
    Completed { project_id: String, iteration_id: String },
    Failed { error: String },
}

/// Wire form of a progress event: `{status}` or terminal `{error}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_id: Option<String>,
}

impl ProgressEvent {
    /// Completed or Failed; the stream ends after one of these
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. })
    }

    /// Human-readable status line
    pub fn message(&self) -> String {
        match self {
            ProgressEvent::ProjectCreated { .. } => "Project created successfully".to_string(),
            ProgressEvent::TagsCreated { labels } => {
                format!("Created {} tags: {}", labels.len(), labels.join(", "))
            }
            ProgressEvent::LabelProcessing { label, image_count } => {
                format!("Processing {} images for class {}", image_count, label)
            }
            ProgressEvent::BatchUploaded { uploaded, total } => {
                format!("Uploaded {}/{} images", uploaded, total)
            }
            ProgressEvent::TrainingStarted { .. } => "Training started".to_string(),
            ProgressEvent::TrainingStatus { status } => format!("Training status: {}", status),
            ProgressEvent::Published { publish_name } => {
                format!("Iteration published as {}", publish_name)
            }
            ProgressEvent::Completed { .. } => {
                "Model trained and published successfully!".to_string()
            }
            ProgressEvent::Failed { error } => error.clone(),
        }
    }

    /// Convert to the `{status}` / `{error}` object sent to clients
    pub fn to_wire(&self) -> WireProgress {
        match self {
            ProgressEvent::Failed { error } => WireProgress {
                status: None,
                error: Some(error.clone()),
                project_id: None,
                iteration_id: None,
            },
            ProgressEvent::ProjectCreated { project_id } => WireProgress {
                status: Some(self.message()),
                error: None,
                project_id: Some(project_id.clone()),
                iteration_id: None,
            },
            ProgressEvent::Completed { project_id, iteration_id } => WireProgress {
                status: Some(self.message()),
                error: None,
                project_id: Some(project_id.clone()),
                iteration_id: Some(iteration_id.clone()),
            },
            _ => WireProgress {
                status: Some(self.message()),
                error: None,
                project_id: None,
                iteration_id: None,
            },
        }
    }
}
