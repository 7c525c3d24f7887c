use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::backend::{BoxStream, Broker};
use crate::error::{BrokerError, BrokerResult};
use crate::types::{AckToken, BrokerCapabilities, BrokerCtx, BrokerEvent, Delivery};

#[derive(Debug, Clone)]
struct QueuedMessage {
    subject: String,
    payload: Vec<u8>,
    published_at: i64,
    delivery_count: u32,
}

struct InFlight {
    message: QueuedMessage,
    deadline: i64,
}

struct ConsumerState {
    filter_subject: String,
    ack_wait: Duration,
    max_deliver: i64,
    max_ack_pending: i64,
    pending: VecDeque<QueuedMessage>,
    in_flight: HashMap<String, InFlight>,
}

struct StreamState {
    subjects: Vec<String>,
    consumers: HashMap<String, ConsumerState>,
}

/// In-memory `Broker`, the conformance reference backend. Lease-expiry
/// reclaim mirrors a reaper sweep: `reap_expired` scans every consumer's
/// in-flight table for deadlines in the past and requeues (or drops, past
/// `max_deliver`) those deliveries, exactly like ack-wait redelivery on a
/// real broker.
pub struct MemoryBroker {
    streams: Arc<RwLock<HashMap<String, StreamState>>>,
    events: broadcast::Sender<BrokerEvent>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Scan every consumer's in-flight table for deliveries whose ack-wait
    /// deadline has passed; requeue under `max_deliver`, drop otherwise.
    /// Returns the number of deliveries reclaimed.
    pub fn reap_expired(&self) -> usize {
        let now = now();
        let mut reclaimed = 0;
        let mut streams = self.streams.write();
        for stream in streams.values_mut() {
            for consumer in stream.consumers.values_mut() {
                let expired: Vec<String> = consumer
                    .in_flight
                    .iter()
                    .filter(|(_, f)| f.deadline < now)
                    .map(|(token, _)| token.clone())
                    .collect();
                for token in expired {
                    if let Some(flight) = consumer.in_flight.remove(&token) {
                        reclaimed += 1;
                        requeue_or_drop(consumer, flight.message);
                    }
                }
            }
        }
        reclaimed
    }

    fn emit(&self, event: BrokerEvent) {
        let _ = self.events.send(event);
    }
}

/// `message.delivery_count` already reflects every attempt consumed by
/// `pull` so far; requeue as-is under `max_deliver`, else drop.
fn requeue_or_drop(consumer: &mut ConsumerState, message: QueuedMessage) {
    if (message.delivery_count as i64) < consumer.max_deliver {
        consumer.pending.push_back(message);
    } else {
        warn!(subject = %message.subject, "dropping message past max_deliver");
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ensure_stream(
        &self,
        _ctx: BrokerCtx,
        name: &str,
        subjects: &[&str],
        _retention: Duration,
    ) -> BrokerResult<()> {
        let mut streams = self.streams.write();
        streams.entry(name.to_string()).or_insert_with(|| StreamState {
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            consumers: HashMap::new(),
        });
        drop(streams);
        self.emit(BrokerEvent::StreamEnsured {
            stream: name.to_string(),
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn ensure_consumer(
        &self,
        _ctx: BrokerCtx,
        stream: &str,
        consumer: &str,
        filter_subject: &str,
        ack_wait: Duration,
        max_deliver: i64,
        max_ack_pending: i64,
    ) -> BrokerResult<()> {
        let mut streams = self.streams.write();
        let stream_state = streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::stream_not_found(stream))?;
        stream_state
            .consumers
            .entry(consumer.to_string())
            .or_insert_with(|| ConsumerState {
                filter_subject: filter_subject.to_string(),
                ack_wait,
                max_deliver,
                max_ack_pending,
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
            });
        drop(streams);
        self.emit(BrokerEvent::ConsumerEnsured {
            stream: stream.to_string(),
            consumer: consumer.to_string(),
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn publish(&self, _ctx: BrokerCtx, subject: &str, payload: Vec<u8>) -> BrokerResult<()> {
        let mut streams = self.streams.write();
        let mut matched = false;
        for stream in streams.values_mut() {
            if !stream.subjects.iter().any(|s| s == subject) {
                continue;
            }
            for consumer in stream.consumers.values_mut() {
                if consumer.filter_subject == subject {
                    matched = true;
                    consumer.pending.push_back(QueuedMessage {
                        subject: subject.to_string(),
                        payload: payload.clone(),
                        published_at: now(),
                        delivery_count: 0,
                    });
                }
            }
        }
        drop(streams);
        if !matched {
            return Err(BrokerError::publish_failed(format!(
                "no stream/consumer accepts subject {subject}"
            )));
        }
        self.emit(BrokerEvent::Published {
            subject: subject.to_string(),
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn pull(
        &self,
        _ctx: BrokerCtx,
        stream: &str,
        consumer: &str,
        batch_size: usize,
        _timeout: Duration,
    ) -> BrokerResult<Vec<Delivery>> {
        let mut streams = self.streams.write();
        let stream_state = streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::stream_not_found(stream))?;
        let consumer_state = stream_state
            .consumers
            .get_mut(consumer)
            .ok_or_else(|| BrokerError::consumer_not_found(stream, consumer))?;

        let mut out = Vec::with_capacity(batch_size);
        while out.len() < batch_size
            && (consumer_state.in_flight.len() as i64) < consumer_state.max_ack_pending
        {
            let Some(mut message) = consumer_state.pending.pop_front() else {
                break;
            };
            message.delivery_count += 1;
            let ack_token = AckToken::new();
            let deadline = now() + consumer_state.ack_wait.as_secs() as i64;
            let delivery = Delivery {
                subject: message.subject.clone(),
                raw_payload: message.payload.clone(),
                ack_token: ack_token.clone(),
                delivery_count: message.delivery_count,
                published_at: message.published_at,
            };
            consumer_state
                .in_flight
                .insert(ack_token.as_str().to_string(), InFlight { message, deadline });
            out.push(delivery);
        }
        drop(streams);

        for delivery in &out {
            self.emit(BrokerEvent::Delivered {
                subject: delivery.subject.clone(),
                delivery_count: delivery.delivery_count,
                at: chrono::Utc::now(),
            });
        }
        Ok(out)
    }

    async fn ack(&self, _ctx: BrokerCtx, stream: &str, consumer: &str, delivery: &Delivery) -> BrokerResult<()> {
        let mut streams = self.streams.write();
        let stream_state = streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::stream_not_found(stream))?;
        let consumer_state = stream_state
            .consumers
            .get_mut(consumer)
            .ok_or_else(|| BrokerError::consumer_not_found(stream, consumer))?;
        if consumer_state
            .in_flight
            .remove(delivery.ack_token.as_str())
            .is_none()
        {
            return Err(BrokerError::ack_failed(
                delivery.ack_token.as_str().to_string(),
                "delivery not in flight (already acked, naked, or expired)".to_string(),
            ));
        }
        drop(streams);
        self.emit(BrokerEvent::Acked {
            subject: delivery.subject.clone(),
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn nak(&self, _ctx: BrokerCtx, stream: &str, consumer: &str, delivery: &Delivery) -> BrokerResult<()> {
        let mut streams = self.streams.write();
        let stream_state = streams
            .get_mut(stream)
            .ok_or_else(|| BrokerError::stream_not_found(stream))?;
        let consumer_state = stream_state
            .consumers
            .get_mut(consumer)
            .ok_or_else(|| BrokerError::consumer_not_found(stream, consumer))?;
        let flight = consumer_state
            .in_flight
            .remove(delivery.ack_token.as_str())
            .ok_or_else(|| {
                BrokerError::ack_failed(
                    delivery.ack_token.as_str().to_string(),
                    "delivery not in flight".to_string(),
                )
            })?;
        requeue_or_drop(consumer_state, flight.message);
        drop(streams);
        self.emit(BrokerEvent::Naked {
            subject: delivery.subject.clone(),
            reason: "nak".to_string(),
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    fn event_stream(&self) -> BoxStream<BrokerEvent> {
        let rx = self.events.subscribe();
        Box::pin(BroadcastStream::new(rx).filter_map(|r| r.ok()))
    }

    fn capabilities(&self) -> BrokerCapabilities {
        BrokerCapabilities::in_memory()
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ensure_topology(broker: &MemoryBroker) {
        broker
            .ensure_stream(BrokerCtx::new(), "S", &["subj"], Duration::from_secs(3600))
            .await
            .unwrap();
        broker
            .ensure_consumer(
                BrokerCtx::new(),
                "S",
                "c1",
                "subj",
                Duration::from_secs(1),
                3,
                10,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn publish_then_pull_then_ack() {
        let broker = MemoryBroker::new();
        ensure_topology(&broker).await;

        broker
            .publish(BrokerCtx::new(), "subj", b"hello".to_vec())
            .await
            .unwrap();

        let delivered = broker
            .pull(BrokerCtx::new(), "S", "c1", 10, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].delivery_count, 1);

        broker
            .ack(BrokerCtx::new(), "S", "c1", &delivered[0])
            .await
            .unwrap();

        let empty = broker
            .pull(BrokerCtx::new(), "S", "c1", 10, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn nak_redelivers_with_incremented_count() {
        let broker = MemoryBroker::new();
        ensure_topology(&broker).await;
        broker
            .publish(BrokerCtx::new(), "subj", b"hello".to_vec())
            .await
            .unwrap();

        let first = broker
            .pull(BrokerCtx::new(), "S", "c1", 10, Duration::from_secs(1))
            .await
            .unwrap();
        broker.nak(BrokerCtx::new(), "S", "c1", &first[0]).await.unwrap();

        let second = broker
            .pull(BrokerCtx::new(), "S", "c1", 10, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn reap_expired_redelivers_past_ack_wait() {
        let broker = MemoryBroker::new();
        ensure_topology(&broker).await;
        broker
            .publish(BrokerCtx::new(), "subj", b"hello".to_vec())
            .await
            .unwrap();

        let delivered = broker
            .pull(BrokerCtx::new(), "S", "c1", 10, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);

        // force the ack-wait deadline into the past
        {
            let mut streams = broker.streams.write();
            let consumer = streams
                .get_mut("S")
                .unwrap()
                .consumers
                .get_mut("c1")
                .unwrap();
            for flight in consumer.in_flight.values_mut() {
                flight.deadline = 0;
            }
        }

        let reclaimed = broker.reap_expired();
        assert_eq!(reclaimed, 1);

        let redelivered = broker
            .pull(BrokerCtx::new(), "S", "c1", 10, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn drops_message_past_max_deliver() {
        let broker = MemoryBroker::new();
        broker
            .ensure_stream(BrokerCtx::new(), "S", &["subj"], Duration::from_secs(3600))
            .await
            .unwrap();
        broker
            .ensure_consumer(BrokerCtx::new(), "S", "c1", "subj", Duration::from_secs(1), 1, 10)
            .await
            .unwrap();
        broker
            .publish(BrokerCtx::new(), "subj", b"hello".to_vec())
            .await
            .unwrap();

        let delivered = broker
            .pull(BrokerCtx::new(), "S", "c1", 10, Duration::from_secs(1))
            .await
            .unwrap();
        broker.nak(BrokerCtx::new(), "S", "c1", &delivered[0]).await.unwrap();

        let after_nak = broker
            .pull(BrokerCtx::new(), "S", "c1", 10, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(after_nak.is_empty(), "max_deliver of 1 should drop on first nak");
    }
}
