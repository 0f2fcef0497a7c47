//! Class image upload
//!
//! POST /upload with multipart `files[]`. Each file is filed under the class
//! named by its prefix before the first `_` (`cat_001.jpg` → `cat`).

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Largest accepted upload body (all files together)
pub const MAX_UPLOAD_BODY_BYTES: usize = 256 * 1024 * 1024;

/// POST /upload response
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    /// Files stored per class
    pub classes: BTreeMap<String, usize>,
}

/// POST /upload
pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut classes: BTreeMap<String, usize> = BTreeMap::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if !matches!(field.name(), Some("files[]") | Some("files")) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read {}: {}", filename, e)))?;

        let class = state.image_store.save_upload(&filename, &bytes).await?;
        *classes.entry(class).or_default() += 1;
    }

    if classes.is_empty() {
        return Err(ApiError::BadRequest("No files provided".to_string()));
    }

    info!(classes = ?classes, "Files uploaded");
    Ok(Json(UploadResponse {
        message: "Files uploaded successfully".to_string(),
        classes,
    }))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route(
        "/upload",
        post(upload_files).layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
    )
}
