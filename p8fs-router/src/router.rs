//! The tiered router's pull-classify-republish-ack loop (§4.3).

use std::sync::Arc;

use p8fs_broker::{Broker, BrokerCtx, Delivery, StorageEvent, Tier, CONSUMER_ROUTER, STREAM_INGRESS};
use p8fs_core::{EventBus, PipelineEvent};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::RouterConfig;
use crate::error::{RouterError, RouterResult};

/// Runs the pull loop until `shutdown` is triggered. On cancellation, the
/// current in-flight batch is allowed to finish (its messages are acked
/// or naked normally) before the loop returns — no message is abandoned
/// mid-handling.
pub async fn run(
    broker: Arc<dyn Broker>,
    ctx: BrokerCtx,
    cfg: RouterConfig,
    events: Arc<EventBus>,
    shutdown: CancellationToken,
) -> RouterResult<()> {
    info!(
        batch_size = cfg.fetch_batch_size,
        timeout_secs = cfg.fetch_timeout.as_secs(),
        "router pull loop starting"
    );

    loop {
        if shutdown.is_cancelled() {
            info!("shutdown signaled, stopping router pull loop");
            return Ok(());
        }

        let deliveries = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!("shutdown signaled while idle, stopping router pull loop");
                return Ok(());
            }
            res = broker.pull(
                ctx.clone(),
                STREAM_INGRESS.name,
                CONSUMER_ROUTER.name,
                cfg.fetch_batch_size,
                cfg.fetch_timeout,
            ) => res?,
        };

        for delivery in deliveries {
            if let Err(e) = handle_one(broker.as_ref(), ctx.clone(), &delivery, &events).await {
                warn!(error = %e, subject = %delivery.subject, "router failed to handle delivery");
            }
        }
    }
}

#[instrument(skip(broker, ctx, delivery, events), fields(subject = %delivery.subject))]
async fn handle_one(
    broker: &dyn Broker,
    ctx: BrokerCtx,
    delivery: &Delivery,
    events: &EventBus,
) -> RouterResult<()> {
    let event: StorageEvent = match serde_json::from_slice(&delivery.raw_payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "malformed storage event, naking for redelivery");
            broker
                .nak(ctx, STREAM_INGRESS.name, CONSUMER_ROUTER.name, delivery)
                .await?;
            return Err(RouterError::MalformedEvent(e.to_string()));
        }
    };

    let tier = Tier::classify(event.size as i64);

    events.publish(PipelineEvent::Classified {
        tenant_id: event.tenant_id.as_str().to_string(),
        path: event.path.clone(),
        tier: tier.name().to_string(),
        at: chrono::Utc::now(),
    });

    // Republish the unmodified raw payload — invariant #9 requires a
    // byte-identical round trip, so we forward `raw_payload` as-is
    // rather than re-serializing `event`.
    match broker
        .publish(ctx.clone(), tier.subject(), delivery.raw_payload.clone())
        .await
    {
        Ok(()) => {
            broker
                .ack(ctx, STREAM_INGRESS.name, CONSUMER_ROUTER.name, delivery)
                .await?;
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, tier = tier.name(), "republish failed, naking ingress message");
            broker
                .nak(ctx, STREAM_INGRESS.name, CONSUMER_ROUTER.name, delivery)
                .await?;
            Err(RouterError::Broker(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p8fs_broker::{ensure_topology, MemoryBroker};
    use std::time::Duration;

    fn sample_event(size: u64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "event_type": "create",
            "path": "/buckets/t1/uploads/2025/01/01/doc.pdf",
            "tenant_id": "t1",
            "size": size,
            "content_type": "application/pdf",
            "timestamp": 1.0,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn republishes_small_event_to_small_subject() {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let ctx = BrokerCtx::new();
        ensure_topology(broker.as_ref(), ctx.clone()).await.unwrap();

        broker
            .publish(ctx.clone(), STREAM_INGRESS.subjects[0], sample_event(1024))
            .await
            .unwrap();

        let deliveries = broker
            .pull(
                ctx.clone(),
                STREAM_INGRESS.name,
                CONSUMER_ROUTER.name,
                10,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);

        let events = Arc::new(EventBus::default());
        handle_one(broker.as_ref(), ctx.clone(), &deliveries[0], &events)
            .await
            .unwrap();

        let small = broker
            .pull(
                ctx.clone(),
                "P8FS_STORAGE_EVENTS_SMALL",
                "small-workers",
                10,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(small.len(), 1);
        assert_eq!(small[0].raw_payload, sample_event(1024));
    }

    #[tokio::test]
    async fn malformed_payload_is_naked_and_redelivered() {
        let broker: Arc<dyn Broker> = Arc::new(MemoryBroker::new());
        let ctx = BrokerCtx::new();
        ensure_topology(broker.as_ref(), ctx.clone()).await.unwrap();

        broker
            .publish(ctx.clone(), STREAM_INGRESS.subjects[0], b"not json".to_vec())
            .await
            .unwrap();

        let deliveries = broker
            .pull(
                ctx.clone(),
                STREAM_INGRESS.name,
                CONSUMER_ROUTER.name,
                10,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);

        let events = Arc::new(EventBus::default());
        let result = handle_one(broker.as_ref(), ctx.clone(), &deliveries[0], &events).await;
        assert!(result.is_err());

        let redelivered = broker
            .pull(
                ctx.clone(),
                STREAM_INGRESS.name,
                CONSUMER_ROUTER.name,
                10,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].delivery_count, 2);
    }
}
