//! Completion poller
//!
//! Waits for a training iteration to reach a terminal status, sleeping with
//! exponential backoff between status queries.

use std::sync::Arc;
use std::time::Duration;
use tm_common::events::ProgressEvent;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ServiceError;
use super::progress::ProgressSink;
use super::provider::{IterationStatus, TrainingProvider};
use crate::utils::{retry_transient, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub base_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    /// Total time allowed before giving up with `PollTimeout`
    pub max_wait: Duration,
    /// Retry budget for a single status query
    pub retry: RetryPolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(2 * 60 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

impl PollSettings {
    /// Next sleep interval after `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() && self.backoff_factor >= 1.0 {
            self.backoff_factor
        } else {
            1.0
        };
        current.mul_f64(factor).min(self.max_interval)
    }
}

/// Number of non-terminal observations before the iteration finished
pub type PollObservations = usize;

pub struct CompletionPoller {
    provider: Arc<dyn TrainingProvider>,
    settings: PollSettings,
}

impl CompletionPoller {
    pub fn new(provider: Arc<dyn TrainingProvider>, settings: PollSettings) -> Self {
        Self { provider, settings }
    }

    /// Poll until `iteration_id` completes
    ///
    /// Emits one `TrainingStatus` event per non-terminal observation.
    pub async fn wait_for_completion(
        &self,
        project_id: &str,
        iteration_id: &str,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PollObservations, ServiceError> {
        let started = Instant::now();
        let mut interval = self.settings.base_interval;
        let mut observations = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }

            let provider = &self.provider;
            let iteration = retry_transient(
                "get iteration status",
                &self.settings.retry,
                cancel,
                |_| async move {
                    provider
                        .get_iteration(project_id, iteration_id)
                        .await
                        .map_err(ServiceError::from)
                },
            )
            .await?;

            match IterationStatus::parse(&iteration.status) {
                IterationStatus::Completed => {
                    info!(
                        job_id = %progress.job_id(),
                        project_id = %project_id,
                        iteration_id = %iteration_id,
                        observations,
                        elapsed_secs = started.elapsed().as_secs(),
                        "Training completed"
                    );
                    return Ok(observations);
                }
                IterationStatus::Failed => {
                    warn!(
                        job_id = %progress.job_id(),
                        iteration_id = %iteration_id,
                        status = %iteration.status,
                        "Training iteration failed"
                    );
                    return Err(ServiceError::TrainingFailed {
                        iteration_id: iteration_id.to_string(),
                        status: iteration.status,
                    });
                }
                IterationStatus::InProgress(status) => {
                    observations += 1;
                    debug!(
                        job_id = %progress.job_id(),
                        iteration_id = %iteration_id,
                        status = %status,
                        next_poll_ms = interval.as_millis() as u64,
                        "Training in progress"
                    );
                    progress.emit(ProgressEvent::TrainingStatus { status });
                }
            }

            let elapsed = started.elapsed();
            if elapsed + interval > self.settings.max_wait {
                return Err(ServiceError::PollTimeout {
                    waited_secs: elapsed.as_secs(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }

            interval = self.settings.next_interval(interval);
        }
    }
}
