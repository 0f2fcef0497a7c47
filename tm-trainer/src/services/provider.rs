//! Training and prediction provider capabilities
//!
//! The orchestrator and dispatcher talk to the vision provider only through
//! these traits. `CustomVisionClient` is the HTTP implementation; tests use
//! scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Hyperparameters;

/// Provider call failures, classified at the HTTP boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Invalid credentials: {0}")]
    Auth(String),

    #[error("Quota exceeded: {0}")]
    Quota(String),

    #[error("Network error: {0}")]
    Transient(String),

    #[error("API error {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Parse error: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::Auth(body),
            429 => ProviderError::Quota(body),
            408 | 500..=599 => ProviderError::Transient(format!("HTTP {}: {}", status, body)),
            _ => ProviderError::Rejected { status, message: body },
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() {
            return ProviderError::InvalidResponse(err.to_string());
        }
        // Timeouts, connection resets, DNS failures
        ProviderError::Transient(err.to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Classification domain offered by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub id: String,
    pub name: String,
    /// "Classification" or "ObjectDetection"
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagInfo {
    pub id: String,
    pub name: String,
}

/// One image of an upload batch
#[derive(Debug, Clone, PartialEq)]
pub struct ImageEntry {
    pub name: String,
    pub contents: Vec<u8>,
    pub tag_ids: Vec<String>,
}

/// Training iteration as reported by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationInfo {
    pub id: String,
    pub status: String,
}

/// Interpretation of `IterationInfo::status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationStatus {
    Completed,
    Failed,
    InProgress(String),
}

impl IterationStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "Completed" => IterationStatus::Completed,
            "Failed" | "Canceled" | "Cancelled" => IterationStatus::Failed,
            other => IterationStatus::InProgress(other.to_string()),
        }
    }
}

/// One class score from the prediction endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub tag_name: String,
    /// 0.0 ..= 1.0
    pub probability: f64,
}

/// Project/tag/image/training operations of the vision training service
#[async_trait]
pub trait TrainingProvider: Send + Sync {
    async fn list_domains(&self) -> Result<Vec<Domain>, ProviderError>;

    /// Create a multiclass classification project in `domain_id`
    async fn create_project(&self, name: &str, domain_id: &str)
        -> Result<ProjectInfo, ProviderError>;

    async fn list_tags(&self, project_id: &str) -> Result<Vec<TagInfo>, ProviderError>;

    async fn create_tag(&self, project_id: &str, name: &str) -> Result<TagInfo, ProviderError>;

    /// Upload one batch; the provider caps batch size at 64
    async fn upload_images(
        &self,
        project_id: &str,
        images: &[ImageEntry],
    ) -> Result<(), ProviderError>;

    /// Start a training iteration restricted to `tag_ids`
    async fn train_project(
        &self,
        project_id: &str,
        tag_ids: &[String],
        hyperparameters: &Hyperparameters,
    ) -> Result<IterationInfo, ProviderError>;

    async fn get_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
    ) -> Result<IterationInfo, ProviderError>;

    async fn publish_iteration(
        &self,
        project_id: &str,
        iteration_id: &str,
        publish_name: &str,
        prediction_resource_id: &str,
    ) -> Result<(), ProviderError>;
}

/// Classification against a published iteration
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    /// Scores in provider order
    async fn classify_image(
        &self,
        project_id: &str,
        published_name: &str,
        image: &[u8],
    ) -> Result<Vec<Prediction>, ProviderError>;
}
