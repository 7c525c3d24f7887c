//! Structured pipeline observability events, generalized from
//! `p8fs-broker`'s `BrokerEvent`/broadcast-channel pattern onto the
//! five-component ingestion pipeline. Every stage transition (classify,
//! download, chunk, upsert, index, ack/nak) is published here so tests
//! and operators can observe the pipeline without scraping logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One event per pipeline stage transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    Enqueued {
        tenant_id: String,
        path: String,
        at: DateTime<Utc>,
    },
    Classified {
        tenant_id: String,
        path: String,
        tier: String,
        at: DateTime<Utc>,
    },
    Downloaded {
        tenant_id: String,
        path: String,
        bytes: u64,
        at: DateTime<Utc>,
    },
    Chunked {
        tenant_id: String,
        file_id: String,
        chunk_count: usize,
        at: DateTime<Utc>,
    },
    Upserted {
        tenant_id: String,
        entity_id: String,
        table: String,
        at: DateTime<Utc>,
    },
    Indexed {
        tenant_id: String,
        entity_id: String,
        ok: bool,
        detail: Option<String>,
        at: DateTime<Utc>,
    },
    Acked {
        tenant_id: String,
        path: String,
        at: DateTime<Utc>,
    },
    Nacked {
        tenant_id: String,
        path: String,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Classified { .. } => "classified",
            Self::Downloaded { .. } => "downloaded",
            Self::Chunked { .. } => "chunked",
            Self::Upserted { .. } => "upserted",
            Self::Indexed { .. } => "indexed",
            Self::Acked { .. } => "acked",
            Self::Nacked { .. } => "nacked",
        }
    }
}

/// Process-wide broadcast hub for [`PipelineEvent`]s: a bounded channel
/// that drops the oldest event under backpressure rather than blocking
/// producers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Best-effort publish: no subscribers is not an error.
    pub fn publish(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(PipelineEvent::Acked {
            tenant_id: "t1".into(),
            path: "/a".into(),
            at: Utc::now(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(PipelineEvent::Enqueued {
            tenant_id: "t1".into(),
            path: "/a".into(),
            at: Utc::now(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "enqueued");
    }
}
