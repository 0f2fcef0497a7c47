//! Training job API handlers
//!
//! POST /train, GET /train/:job_id, GET /train/:job_id/events,
//! POST /train/:job_id/cancel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use tm_common::sse::HEARTBEAT_INTERVAL;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::TrainingRequest;
use crate::services::JobHandle;
use crate::AppState;

/// POST /train
///
/// Validate the request and schedule the job. Returns 202 Accepted with the
/// job handle; progress is read from `/train/:job_id/events`.
pub async fn start_training(
    State(state): State<AppState>,
    Json(request): Json<TrainingRequest>,
) -> ApiResult<(StatusCode, Json<JobHandle>)> {
    let handle = state.training.submit(request).await?;
    Ok((StatusCode::ACCEPTED, Json(handle)))
}

/// GET /train/:job_id
pub async fn get_training_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobHandle>> {
    Ok(Json(state.training.status(job_id).await?))
}

/// POST /train/:job_id/cancel
pub async fn cancel_training(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobHandle>> {
    Ok(Json(state.training.cancel(job_id).await?))
}

/// GET /train/:job_id/events
///
/// Streams `{status}` objects and ends with one `{status, project_id,
/// iteration_id}` or `{error}` object. Only one client may consume the
/// stream; later attempts get 409 Conflict.
pub async fn training_event_stream(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = state.training.take_events(job_id).await?;
    info!(job_id = %job_id, "Client attached to training progress stream");

    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let wire = event.to_wire();
        let frame = match Event::default().json_data(&wire) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(job_id = %job_id, "SSE: Failed to serialize progress event: {}", e);
                Event::default().data(event.message())
            }
        };
        Ok::<_, Infallible>(frame)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(HEARTBEAT_INTERVAL)))
}

/// Build training routes
pub fn training_routes() -> Router<AppState> {
    Router::new()
        .route("/train", post(start_training))
        .route("/train/:job_id", get(get_training_status))
        .route("/train/:job_id/events", get(training_event_stream))
        .route("/train/:job_id/cancel", post(cancel_training))
}
