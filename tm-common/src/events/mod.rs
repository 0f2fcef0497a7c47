//! Event types for the tm event system
//!
//! Per-job progress events travel over a dedicated channel owned by each job.
//! Service-wide lifecycle notifications go through the [`EventBus`].

mod job_types;

pub use job_types::{JobState, ProgressEvent, WireProgress};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Service-wide job lifecycle events
///
/// Broadcast via EventBus and serialized for the `/events` SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServiceEvent {
    /// A training job was accepted and scheduled
    JobSubmitted {
        job_id: Uuid,
        classes: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A job moved to a new lifecycle state
    JobStateChanged {
        job_id: Uuid,
        old_state: JobState,
        new_state: JobState,
        timestamp: DateTime<Utc>,
    },

    /// A job finished and its model reference was persisted
    JobCompleted {
        job_id: Uuid,
        project_id: String,
        iteration_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A job reached the Failed state
    JobFailed {
        job_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServiceEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            ServiceEvent::JobSubmitted { .. } => "JobSubmitted",
            ServiceEvent::JobStateChanged { .. } => "JobStateChanged",
            ServiceEvent::JobCompleted { .. } => "JobCompleted",
            ServiceEvent::JobFailed { .. } => "JobFailed",
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use tm_common::events::{EventBus, ServiceEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(ServiceEvent::JobFailed {
///     job_id: uuid::Uuid::new_v4(),
///     error: "cancelled".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServiceEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ServiceEvent,
    ) -> Result<usize, broadcast::error::SendError<ServiceEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ServiceEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_errors() {
        let bus = EventBus::new(10);
        let result = bus.emit(ServiceEvent::JobSubmitted {
            job_id: Uuid::new_v4(),
            classes: vec!["cat".into()],
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.capacity(), 10);
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let job_id = Uuid::new_v4();
        bus.emit(ServiceEvent::JobStateChanged {
            job_id,
            old_state: JobState::Created,
            new_state: JobState::ProjectProvisioned,
            timestamp: Utc::now(),
        })
        .unwrap();

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                ServiceEvent::JobStateChanged { job_id: id, new_state, .. } => {
                    assert_eq!(id, job_id);
                    assert_eq!(new_state, JobState::ProjectProvisioned);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_event_tagged_serialization() {
        let event = ServiceEvent::JobCompleted {
            job_id: Uuid::nil(),
            project_id: "p".into(),
            iteration_id: "i".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "JobCompleted");
        assert_eq!(event.event_type(), "JobCompleted");
    }
}
