use std::str::FromStr;
use std::time::Duration;

use async_nats::jetstream::{self, consumer::pull::Config as PullConfig, stream::Config as StreamConfig};
use async_nats::jetstream::consumer::AckPolicy;
use async_trait::async_trait;
use futures_util::StreamExt as _;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::backend::{BoxStream, Broker};
use crate::error::{BrokerError, BrokerResult};
use crate::types::{AckToken, BrokerCapabilities, BrokerCtx, BrokerEvent, Delivery};

const RECONNECT_GAP: Duration = Duration::from_secs(2);
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Production `Broker` backed by a real NATS JetStream deployment.
/// Connection is established with automatic reconnect; this backend adds
/// a bounded reconnect loop on top of `async-nats`'s own retry so state
/// changes are logged and surfaced as `BrokerEvent`s the way the
/// in-process broadcast channel already does for the memory backend.
pub struct NatsBroker {
    jetstream: jetstream::Context,
    events: broadcast::Sender<BrokerEvent>,
}

impl NatsBroker {
    /// Connect with bounded reconnect (fixed 2s gap, up to 10 attempts)
    /// before giving up.
    pub async fn connect(url: &str) -> BrokerResult<Self> {
        let mut attempt = 0;
        let client = loop {
            match async_nats::connect(url).await {
                Ok(client) => break client,
                Err(err) => {
                    attempt += 1;
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        return Err(BrokerError::connection(format!(
                            "giving up after {attempt} attempts: {err}"
                        )));
                    }
                    warn!(attempt, %err, "nats connect failed, retrying");
                    tokio::time::sleep(RECONNECT_GAP).await;
                }
            }
        };
        let jetstream = jetstream::new(client);
        let (events, _) = broadcast::channel(1024);
        Ok(Self { jetstream, events })
    }

    fn emit(&self, event: BrokerEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn ensure_stream(
        &self,
        _ctx: BrokerCtx,
        name: &str,
        subjects: &[&str],
        retention: Duration,
    ) -> BrokerResult<()> {
        self.jetstream
            .get_or_create_stream(StreamConfig {
                name: name.to_string(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
                retention: jetstream::stream::RetentionPolicy::WorkQueue,
                max_age: retention,
                ..Default::default()
            })
            .await
            .map_err(|e| BrokerError::connection(e.to_string()))?;
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
        let stream_handle = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|_| BrokerError::stream_not_found(stream))?;
        stream_handle
            .get_or_create_consumer(
                consumer,
                PullConfig {
                    durable_name: Some(consumer.to_string()),
                    filter_subject: filter_subject.to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ack_wait,
                    max_deliver,
                    max_ack_pending,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrokerError::connection(e.to_string()))?;
        self.emit(BrokerEvent::ConsumerEnsured {
            stream: stream.to_string(),
            consumer: consumer.to_string(),
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn publish(&self, _ctx: BrokerCtx, subject: &str, payload: Vec<u8>) -> BrokerResult<()> {
        let subject = async_nats::Subject::from_str(subject)
            .map_err(|e| BrokerError::publish_failed(e.to_string()))?;
        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| BrokerError::publish_failed(e.to_string()))?
            .await
            .map_err(|e| BrokerError::publish_failed(e.to_string()))?;
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
        timeout: Duration,
    ) -> BrokerResult<Vec<Delivery>> {
        let stream_handle = self
            .jetstream
            .get_stream(stream)
            .await
            .map_err(|_| BrokerError::stream_not_found(stream))?;
        let consumer_handle: jetstream::consumer::PullConsumer = stream_handle
            .get_consumer(consumer)
            .await
            .map_err(|_| BrokerError::consumer_not_found(stream, consumer))?;

        let mut batch = consumer_handle
            .fetch()
            .max_messages(batch_size)
            .expires(timeout)
            .messages()
            .await
            .map_err(|e| BrokerError::pull_failed(e.to_string()))?;

        let mut out = Vec::with_capacity(batch_size);
        while let Some(message) = batch.next().await {
            let message = message.map_err(|e| BrokerError::pull_failed(e.to_string()))?;
            let info = message
                .info()
                .map_err(|e| BrokerError::pull_failed(e.to_string()))?;
            // The ack token carries the message's private reply subject so
            // `ack`/`nak` can acknowledge it later without holding onto the
            // `jetstream::Message` object itself.
            let ack_token = message
                .reply
                .clone()
                .map(|s| AckToken(s.to_string()))
                .unwrap_or_default();
            out.push(Delivery {
                subject: message.subject.to_string(),
                raw_payload: message.payload.to_vec(),
                ack_token,
                delivery_count: info.delivered as u32,
                published_at: info.published.unix_timestamp(),
            });
        }

        for delivery in &out {
            self.emit(BrokerEvent::Delivered {
                subject: delivery.subject.clone(),
                delivery_count: delivery.delivery_count,
                at: chrono::Utc::now(),
            });
        }
        info!(stream, consumer, count = out.len(), "pulled batch");
        Ok(out)
    }

    async fn ack(&self, _ctx: BrokerCtx, _stream: &str, _consumer: &str, delivery: &Delivery) -> BrokerResult<()> {
        let reply = async_nats::Subject::from_str(delivery.ack_token.as_str())
            .map_err(|e| BrokerError::ack_failed(delivery.ack_token.as_str().to_string(), e.to_string()))?;
        self.jetstream
            .publish(reply, "".into())
            .await
            .map_err(|e| BrokerError::ack_failed(delivery.ack_token.as_str().to_string(), e.to_string()))?;
        self.emit(BrokerEvent::Acked {
            subject: delivery.subject.clone(),
            at: chrono::Utc::now(),
        });
        Ok(())
    }

    async fn nak(&self, _ctx: BrokerCtx, _stream: &str, _consumer: &str, delivery: &Delivery) -> BrokerResult<()> {
        let reply = async_nats::Subject::from_str(delivery.ack_token.as_str())
            .map_err(|e| BrokerError::ack_failed(delivery.ack_token.as_str().to_string(), e.to_string()))?;
        self.jetstream
            .publish(reply, "-NAK".into())
            .await
            .map_err(|e| BrokerError::ack_failed(delivery.ack_token.as_str().to_string(), e.to_string()))?;
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
        BrokerCapabilities::durable_broker()
    }
}
