pub mod memory;
pub mod nats;

use async_trait::async_trait;
use futures_core::Stream;
use std::pin::Pin;
use std::time::Duration;

use crate::error::BrokerResult;
use crate::types::{BrokerCapabilities, BrokerCtx, BrokerEvent, Delivery};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// JetStream-style durable pub/sub primitives: streams, pull consumers,
/// publish/pull/ack/nak. Implementations: `memory::MemoryBroker` (tests,
/// conformance) and `nats::NatsBroker` (production).
#[async_trait]
pub trait Broker: Send + Sync {
    /// Idempotently ensure a stream exists with the given subjects,
    /// retention and max-consumers. Succeeds silently if an equivalent
    /// stream already exists.
    async fn ensure_stream(
        &self,
        ctx: BrokerCtx,
        name: &str,
        subjects: &[&str],
        retention: Duration,
    ) -> BrokerResult<()>;

    /// Idempotently ensure a durable pull consumer exists on a stream.
    async fn ensure_consumer(
        &self,
        ctx: BrokerCtx,
        stream: &str,
        consumer: &str,
        filter_subject: &str,
        ack_wait: Duration,
        max_deliver: i64,
        max_ack_pending: i64,
    ) -> BrokerResult<()>;

    /// Publish a JSON payload to `subject`.
    async fn publish(&self, ctx: BrokerCtx, subject: &str, payload: Vec<u8>) -> BrokerResult<()>;

    /// Pull up to `batch_size` messages from `consumer` on `stream`,
    /// waiting at most `timeout` for the first message.
    async fn pull(
        &self,
        ctx: BrokerCtx,
        stream: &str,
        consumer: &str,
        batch_size: usize,
        timeout: Duration,
    ) -> BrokerResult<Vec<Delivery>>;

    /// Positively acknowledge a delivery, removing it from the stream's
    /// redelivery tracking.
    async fn ack(&self, ctx: BrokerCtx, stream: &str, consumer: &str, delivery: &Delivery) -> BrokerResult<()>;

    /// Negatively acknowledge a delivery, making it immediately eligible
    /// for redelivery (subject to `max_deliver`).
    async fn nak(&self, ctx: BrokerCtx, stream: &str, consumer: &str, delivery: &Delivery) -> BrokerResult<()>;

    /// Event stream for observability (boxed for stable Rust).
    fn event_stream(&self) -> BoxStream<BrokerEvent>;

    /// Get backend capabilities.
    fn capabilities(&self) -> BrokerCapabilities;
}
