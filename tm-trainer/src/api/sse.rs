//! Server-Sent Events for service-wide job lifecycle
//!
//! Streams JobSubmitted, JobStateChanged, JobCompleted and JobFailed for
//! every job. Per-job progress lives at `/train/:job_id/events`.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tm_common::sse::event_bus_sse_stream(&state.event_bus, "tm-trainer")
}
