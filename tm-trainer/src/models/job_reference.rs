//! Persisted pointer to a trained, published model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the append-only `job_references` table
///
/// The authoritative reference is the one with the highest `id`, i.e. the
/// last one committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReference {
    pub id: i64,
    pub project_id: String,
    pub iteration_id: String,
    /// Name the iteration was published under; prediction calls address it
    pub published_name: String,
    /// Whether training images were enhanced before upload
    pub enhanced: bool,
    pub created_at: DateTime<Utc>,
}

/// Reference about to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewJobReference {
    pub project_id: String,
    pub iteration_id: String,
    pub published_name: String,
    pub enhanced: bool,
}
