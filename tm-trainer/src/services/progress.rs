//! Per-job progress channel
//!
//! Each job owns one sender. The single receiver is handed to the first
//! client that asks for the job's event stream; once the job ends the sender
//! is dropped and the stream finishes.

use tm_common::events::ProgressEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Sending half of a job's progress channel
#[derive(Debug, Clone)]
pub struct ProgressSink {
    job_id: Uuid,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSink {
    pub fn channel(job_id: Uuid) -> (Self, ProgressReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { job_id, tx }, rx)
    }

    /// Emit one event; a dropped receiver is not an error
    pub fn emit(&self, event: ProgressEvent) {
        tracing::debug!(job_id = %self.job_id, status = %event.message(), "Progress");
        if self.tx.send(event).is_err() {
            tracing::trace!(job_id = %self.job_id, "Progress receiver dropped");
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }
}
