//! Process-wide registry of submitted jobs
//!
//! Tracks, per job, the cancellation token, the latest observed state and
//! the progress receiver until a client takes it. Provider identifiers stay
//! with the job run. Finished jobs are removed after a retention period.

use std::collections::HashMap;
use std::time::Duration;
use tm_common::events::JobState;
use tokio::sync::{watch, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::ServiceError;
use super::progress::ProgressReceiver;

const IDLE_CHECK_INTERVAL: Duration = Duration::from_millis(50);

struct JobEntry {
    cancel: CancellationToken,
    state: watch::Receiver<JobState>,
    events: Option<ProgressReceiver>,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(
        &self,
        job_id: Uuid,
        cancel: CancellationToken,
        state: watch::Receiver<JobState>,
        events: ProgressReceiver,
    ) {
        self.jobs.write().await.insert(
            job_id,
            JobEntry {
                cancel,
                state,
                events: Some(events),
            },
        );
    }

    /// Hand out the job's progress stream; only the first caller gets it
    pub async fn take_events(&self, job_id: Uuid) -> Result<ProgressReceiver, ServiceError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job_id).ok_or(ServiceError::JobNotFound(job_id))?;
        entry
            .events
            .take()
            .ok_or(ServiceError::EventsAlreadyConsumed(job_id))
    }

    pub async fn state(&self, job_id: Uuid) -> Result<JobState, ServiceError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(ServiceError::JobNotFound(job_id))?;
        let state = *entry.state.borrow();
        Ok(state)
    }

    /// Fire the job's cancellation token
    ///
    /// Returns the state observed at the time of the request; the job moves
    /// to `Failed` at its next checkpoint.
    pub async fn cancel(&self, job_id: Uuid) -> Result<JobState, ServiceError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(ServiceError::JobNotFound(job_id))?;
        let state = *entry.state.borrow();
        if state.is_terminal() {
            return Err(ServiceError::JobAlreadyFinished { job_id, state });
        }
        entry.cancel.cancel();
        tracing::info!(job_id = %job_id, state = %state, "Cancellation requested");
        Ok(state)
    }

    /// Cancel every running job (service shutdown)
    pub async fn cancel_all(&self) -> usize {
        let jobs = self.jobs.read().await;
        let mut cancelled = 0;
        for entry in jobs.values() {
            if !entry.state.borrow().is_terminal() {
                entry.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drop a job's entry, including any unread progress events
    pub async fn remove(&self, job_id: Uuid) -> bool {
        let removed = self.jobs.write().await.remove(&job_id).is_some();
        if removed {
            tracing::debug!(job_id = %job_id, "Job removed from registry");
        }
        removed
    }

    /// Wait until no job is running, at most `timeout`
    ///
    /// Returns `true` when every job reached a terminal state in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.active_count().await == 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(IDLE_CHECK_INTERVAL).await;
        }
    }

    /// Number of jobs not yet in a terminal state
    pub async fn active_count(&self) -> usize {
        let jobs = self.jobs.read().await;
        jobs.values()
            .filter(|entry| !entry.state.borrow().is_terminal())
            .count()
    }
}
