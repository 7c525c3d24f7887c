//! Durable pub/sub broker abstraction for the P8FS storage event
//! pipeline: streams, durable pull consumers, and publish/pull/ack/nak
//! over a JetStream-style substrate.
//!
//! `backend::memory::MemoryBroker` is the in-process conformance
//! reference used by tests and by the router/worker binaries in
//! test-mode; `backend::nats::NatsBroker` is the production backend.

pub mod backend;
pub mod error;
pub mod topology;
pub mod types;

pub use backend::{memory::MemoryBroker, nats::NatsBroker, Broker, BoxStream};
pub use error::{BrokerError, BrokerResult};
pub use topology::{
    ConsumerConfig, StreamConfig, Tier, CONSUMER_LARGE, CONSUMER_MEDIUM, CONSUMER_ROUTER,
    CONSUMER_SMALL, INGRESS_SUBJECT, STORAGE_CONSUMERS, STORAGE_STREAMS, STREAM_INGRESS,
    STREAM_LARGE, STREAM_MEDIUM, STREAM_SMALL,
};
pub use types::{
    AckToken, BrokerCapabilities, BrokerCtx, BrokerEvent, ConsumerName, Delivery, EventType,
    StorageEvent, StreamName,
};

/// Idempotently provision the full four-stream/four-consumer topology on
/// a broker. Called once at startup by both the router and worker
/// binaries.
pub async fn ensure_topology(broker: &dyn Broker, ctx: BrokerCtx) -> BrokerResult<()> {
    for stream in STORAGE_STREAMS {
        broker
            .ensure_stream(ctx.clone(), stream.name, stream.subjects, stream.retention)
            .await?;
    }
    for consumer in STORAGE_CONSUMERS {
        broker
            .ensure_consumer(
                ctx.clone(),
                consumer.stream,
                consumer.name,
                consumer.filter_subject,
                consumer.ack_wait,
                consumer.max_deliver,
                consumer.max_ack_pending,
            )
            .await?;
    }
    Ok(())
}

pub mod prelude {
    pub use crate::{
        ensure_topology, Broker, BrokerCtx, BrokerError, BrokerResult, Delivery, StorageEvent,
        Tier,
    };
    pub use async_trait::async_trait;
}
