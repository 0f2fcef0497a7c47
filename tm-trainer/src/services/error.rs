//! Service error taxonomy
//!
//! Every failure a training job or prediction can hit is one of these.
//! `is_transient` drives retry-with-backoff; everything else fails fast.

use thiserror::Error;
use tm_common::events::JobState;
use uuid::Uuid;

use super::provider::ProviderError;

/// Errors raised by the orchestration and prediction services
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// Submission rejected before any provider call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider rejected our credentials
    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    /// Provider quota or rate limit exhausted
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Network failure, timeout or provider-side 5xx
    #[error("Transient provider failure: {0}")]
    ProviderTransient(String),

    /// Provider refused the request for any other reason
    #[error("Provider rejected request ({status}): {message}")]
    ProviderRejected { status: u16, message: String },

    /// Provider reported the training iteration as failed
    #[error("Training iteration {iteration_id} ended with status {status}")]
    TrainingFailed { iteration_id: String, status: String },

    /// Training did not finish within the configured maximum wait
    #[error("Training did not complete within {waited_secs}s")]
    PollTimeout { waited_secs: u64 },

    /// Enhancement of one image failed
    #[error("Enhancement failed for {label}/{image}: {message}")]
    Enhancement {
        label: String,
        image: String,
        message: String,
    },

    /// Predict attempted before any job completed
    #[error("Model not trained yet")]
    JobReferenceNotFound,

    /// Job cancellation token fired
    #[error("cancelled")]
    Cancelled,

    #[error("Training job not found: {0}")]
    JobNotFound(Uuid),

    /// The single-consumer progress stream was already taken
    #[error("Progress stream for job {0} was already consumed")]
    EventsAlreadyConsumed(Uuid),

    #[error("Job {job_id} already finished in state {state}")]
    JobAlreadyFinished { job_id: Uuid, state: JobState },

    /// Database or filesystem failure
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::ProviderTransient(_))
    }
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Auth(msg) => ServiceError::ProviderAuth(msg),
            ProviderError::Quota(msg) => ServiceError::ProviderQuota(msg),
            ProviderError::Transient(msg) => ServiceError::ProviderTransient(msg),
            ProviderError::Rejected { status, message } => {
                ServiceError::ProviderRejected { status, message }
            }
            ProviderError::InvalidResponse(msg) => ServiceError::ProviderRejected {
                status: 200,
                message: format!("unexpected response: {}", msg),
            },
        }
    }
}

impl From<tm_common::Error> for ServiceError {
    fn from(err: tm_common::Error) -> Self {
        match err {
            tm_common::Error::InvalidInput(msg) => ServiceError::Validation(msg),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::Storage(err.to_string())
    }
}
