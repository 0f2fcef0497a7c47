//! Job reference store
//!
//! Durable record of trained models with an in-process cache of the latest
//! committed reference. The cache only ever moves forward by row id, so a
//! slow writer finishing late cannot hide a newer reference.

use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::error::ServiceError;
use crate::db::job_references;
use crate::models::{JobReference, NewJobReference};

#[derive(Clone)]
pub struct JobReferenceStore {
    pool: SqlitePool,
    latest: Arc<RwLock<Option<JobReference>>>,
}

impl JobReferenceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Insert a new immutable reference and advance the cache
    pub async fn write(&self, reference: NewJobReference) -> Result<JobReference, ServiceError> {
        let stored = job_references::insert_reference(&self.pool, &reference).await?;
        self.remember(&stored).await;

        info!(
            reference_id = stored.id,
            project_id = %stored.project_id,
            iteration_id = %stored.iteration_id,
            "Job reference committed"
        );
        Ok(stored)
    }

    /// Last committed reference
    pub async fn read_latest(&self) -> Result<JobReference, ServiceError> {
        match job_references::load_latest(&self.pool).await? {
            Some(reference) => {
                self.remember(&reference).await;
                Ok(reference)
            }
            None => Err(ServiceError::JobReferenceNotFound),
        }
    }

    /// Cached latest reference, without touching the database
    pub async fn cached(&self) -> Option<JobReference> {
        self.latest.read().await.clone()
    }

    async fn remember(&self, reference: &JobReference) {
        let mut latest = self.latest.write().await;
        let newer = latest.as_ref().map_or(true, |current| reference.id > current.id);
        if newer {
            *latest = Some(reference.clone());
        }
    }
}
