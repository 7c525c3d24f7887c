use std::time::Duration;

use p8fs_broker::{ensure_topology, Broker, BrokerCtx, MemoryBroker, STORAGE_CONSUMERS, STORAGE_STREAMS};

#[tokio::test]
async fn ensure_topology_is_idempotent() {
    let broker = MemoryBroker::new();
    ensure_topology(&broker, BrokerCtx::new()).await.unwrap();
    // a second call against the same broker must succeed silently
    ensure_topology(&broker, BrokerCtx::new()).await.unwrap();

    for stream in STORAGE_STREAMS {
        broker
            .ensure_consumer(
                BrokerCtx::new(),
                stream.name,
                "probe",
                stream.subjects[0],
                Duration::from_secs(1),
                1,
                1,
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn publish_on_ingress_is_pulled_by_router_consumer() {
    let broker = MemoryBroker::new();
    ensure_topology(&broker, BrokerCtx::new()).await.unwrap();

    broker
        .publish(BrokerCtx::new(), "p8fs.storage.events", br#"{"size":1}"#.to_vec())
        .await
        .unwrap();

    let delivered = broker
        .pull(
            BrokerCtx::new(),
            "P8FS_STORAGE_EVENTS",
            "router-consumer",
            10,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].subject, "p8fs.storage.events");
}

#[tokio::test]
async fn republish_to_tier_subject_is_pulled_by_tier_consumer() {
    let broker = MemoryBroker::new();
    ensure_topology(&broker, BrokerCtx::new()).await.unwrap();

    broker
        .publish(
            BrokerCtx::new(),
            "p8fs.storage.events.small",
            br#"{"size":1}"#.to_vec(),
        )
        .await
        .unwrap();

    let delivered = broker
        .pull(
            BrokerCtx::new(),
            "P8FS_STORAGE_EVENTS_SMALL",
            "small-workers",
            10,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(delivered.len(), 1);

    broker
        .ack(
            BrokerCtx::new(),
            "P8FS_STORAGE_EVENTS_SMALL",
            "small-workers",
            &delivered[0],
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn nak_on_ingress_redelivers_up_to_max_deliver() {
    let broker = MemoryBroker::new();
    ensure_topology(&broker, BrokerCtx::new()).await.unwrap();
    assert_eq!(STORAGE_CONSUMERS[0].name, "router-consumer");
    assert_eq!(STORAGE_CONSUMERS[0].max_deliver, 5);

    broker
        .publish(BrokerCtx::new(), "p8fs.storage.events", b"bad json".to_vec())
        .await
        .unwrap();

    let mut last_delivery_count = 0;
    for _ in 0..5 {
        let delivered = broker
            .pull(
                BrokerCtx::new(),
                "P8FS_STORAGE_EVENTS",
                "router-consumer",
                1,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(delivered.len(), 1);
        last_delivery_count = delivered[0].delivery_count;
        broker
            .nak(
                BrokerCtx::new(),
                "P8FS_STORAGE_EVENTS",
                "router-consumer",
                &delivered[0],
            )
            .await
            .unwrap();
    }
    assert_eq!(last_delivery_count, 5);

    let after_exhaustion = broker
        .pull(
            BrokerCtx::new(),
            "P8FS_STORAGE_EVENTS",
            "router-consumer",
            1,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert!(after_exhaustion.is_empty(), "message should be dropped past max_deliver");
}
