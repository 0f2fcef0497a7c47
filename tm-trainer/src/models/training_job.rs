//! Training job model
//!
//! A `TrainingJob` is created at submission and mutated only by the
//! orchestrator driving it. Provider identifiers are filled in on success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use tm_common::events::JobState;
use uuid::Uuid;

use crate::services::ServiceError;

/// Default number of training epochs
pub const DEFAULT_EPOCHS: u32 = 50;
/// Default training batch size
pub const DEFAULT_BATCH_SIZE: u32 = 32;
/// Default learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 0.001;

/// Training hyperparameters forwarded to the provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub epochs: u32,
    pub batch_size: u32,
    pub learning_rate: f64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            batch_size: DEFAULT_BATCH_SIZE,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

impl Hyperparameters {
    /// All values must be strictly positive
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.epochs == 0 {
            return Err(ServiceError::Validation("epochs must be greater than 0".into()));
        }
        if self.batch_size == 0 {
            return Err(ServiceError::Validation("batch_size must be greater than 0".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ServiceError::Validation(
                "learning_rate must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

/// `POST /train` request body
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingRequest {
    pub classes: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_on_off")]
    pub enhance_images: bool,
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

fn default_epochs() -> u32 {
    DEFAULT_EPOCHS
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

impl TrainingRequest {
    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
        }
    }
}

/// Accept `true`/`false` as well as the form values `"on"`/`"off"`
pub fn deserialize_on_off<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(value) => Ok(value),
        Flag::Text(text) => parse_on_off(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("expected \"on\" or \"off\", got {:?}", text))
        }),
    }
}

/// Parse an `"on"`/`"off"` style flag
pub fn parse_on_off(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Some(true),
        "off" | "false" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

/// One end-to-end run from project provisioning through publishing
#[derive(Debug, Clone, Serialize)]
pub struct TrainingJob {
    pub job_id: Uuid,
    /// Class labels, unique, in submission order
    pub classes: Vec<String>,
    pub enhance_images: bool,
    pub hyperparameters: Hyperparameters,
    pub state: JobState,
    /// Provider project, set once the job completes
    pub project_id: Option<String>,
    /// Provider iteration, set once the job completes
    pub iteration_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TrainingJob {
    /// Validate a submission and create the job in `Created` state
    pub fn from_request(request: TrainingRequest) -> Result<Self, ServiceError> {
        let hyperparameters = request.hyperparameters();
        hyperparameters.validate()?;
        let classes = validate_classes(request.classes)?;

        Ok(Self {
            job_id: Uuid::new_v4(),
            classes,
            enhance_images: request.enhance_images,
            hyperparameters,
            state: JobState::Created,
            project_id: None,
            iteration_id: None,
            submitted_at: Utc::now(),
            finished_at: None,
        })
    }

    /// Move to `to`, rejecting transitions the lifecycle does not allow
    pub fn transition_to(&mut self, to: JobState) -> Result<JobState, ServiceError> {
        if !self.state.can_transition_to(to) {
            return Err(ServiceError::Internal(format!(
                "illegal job transition {} -> {}",
                self.state, to
            )));
        }
        let old = self.state;
        self.state = to;
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(old)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Classes must be non-empty, individually non-blank and unique
fn validate_classes(classes: Vec<String>) -> Result<Vec<String>, ServiceError> {
    if classes.is_empty() {
        return Err(ServiceError::Validation("at least one class is required".into()));
    }

    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(classes.len());
    for class in classes {
        let class = class.trim().to_string();
        if class.is_empty() {
            return Err(ServiceError::Validation("class names must not be empty".into()));
        }
        if class.contains('/') || class.contains('\\') || class == "." || class == ".." {
            return Err(ServiceError::Validation(format!(
                "invalid class name: {:?}",
                class
            )));
        }
        if !seen.insert(class.clone()) {
            return Err(ServiceError::Validation(format!("duplicate class: {}", class)));
        }
        validated.push(class);
    }
    Ok(validated)
}
