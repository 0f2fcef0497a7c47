//! Error types for tm-trainer HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::ServiceError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Conflict (409), e.g. progress stream already consumed
    #[error("{0}")]
    Conflict(String),

    /// Upstream provider failure (502)
    #[error("{0}")]
    BadGateway(String),

    /// Internal server error (500)
    #[error("{0}")]
    Internal(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Validation(_) | ServiceError::JobAlreadyFinished { .. } => {
                ApiError::BadRequest(message)
            }
            ServiceError::JobReferenceNotFound | ServiceError::JobNotFound(_) => {
                ApiError::NotFound(message)
            }
            ServiceError::EventsAlreadyConsumed(_) => ApiError::Conflict(message),
            ServiceError::ProviderAuth(_)
            | ServiceError::ProviderQuota(_)
            | ServiceError::ProviderTransient(_)
            | ServiceError::ProviderRejected { .. }
            | ServiceError::TrainingFailed { .. }
            | ServiceError::PollTimeout { .. }
            | ServiceError::Enhancement { .. } => ApiError::BadGateway(message),
            ServiceError::Cancelled | ServiceError::Storage(_) | ServiceError::Internal(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl From<tm_common::Error> for ApiError {
    fn from(err: tm_common::Error) -> Self {
        ServiceError::from(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::BadGateway(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "code": error_code,
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status_of(err: ServiceError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(ServiceError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ServiceError::JobReferenceNotFound), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ServiceError::EventsAlreadyConsumed(Uuid::nil())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ServiceError::ProviderTransient("503".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(ServiceError::Storage("disk".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_trained_message_passes_through() {
        let err = ApiError::from(ServiceError::JobReferenceNotFound);
        assert_eq!(err.to_string(), "Model not trained yet");
    }
}
