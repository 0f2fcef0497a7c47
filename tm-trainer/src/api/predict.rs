//! Prediction API handlers
//!
//! POST /predict, GET /reference

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::models::{parse_on_off, JobReference, PredictionRequest, PredictionResult};
use crate::AppState;

/// Largest accepted request body for image uploads
pub const MAX_IMAGE_BODY_BYTES: usize = 32 * 1024 * 1024;

/// POST /predict
///
/// Multipart fields: `image` (required) and `enhance_images` ("on"/"off",
/// optional; defaults to the choice made when the model was trained).
pub async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<PredictionResult>> {
    let mut image = None;
    let mut enhance_images = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read image: {}", e)))?;
                image = Some(bytes.to_vec());
            }
            Some("enhance_images") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid enhance_images: {}", e)))?;
                let flag = parse_on_off(&text).ok_or_else(|| {
                    ApiError::BadRequest(format!("enhance_images must be \"on\" or \"off\", got {:?}", text))
                })?;
                enhance_images = Some(flag);
            }
            other => debug!(field = ?other, "Ignoring unknown multipart field"),
        }
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("No image provided".to_string()))?;

    let result = state
        .predictions
        .predict(PredictionRequest {
            image,
            enhance_images,
        })
        .await?;

    Ok(Json(result))
}

/// GET /reference
///
/// Latest persisted job reference, or 404 when no model has been trained.
pub async fn latest_reference(State(state): State<AppState>) -> ApiResult<Json<JobReference>> {
    Ok(Json(state.references.read_latest().await?))
}

/// Build prediction routes
pub fn predict_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/predict",
            post(predict).layer(DefaultBodyLimit::max(MAX_IMAGE_BODY_BYTES)),
        )
        .route("/reference", get(latest_reference))
}
