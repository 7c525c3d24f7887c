use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use p8fs_broker::{ensure_topology, Broker, BrokerCtx, MemoryBroker, NatsBroker, CONSUMER_ROUTER};
use p8fs_core::EventBus;
use p8fs_router::{RouterConfig, run};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = RouterConfig::from_env();

    let broker: Arc<dyn Broker> = match &cfg.nats_url {
        Some(url) => {
            info!(%url, "connecting to NATS JetStream");
            Arc::new(NatsBroker::connect(url).await?)
        }
        None => {
            info!("no P8FS_ROUTER__NATS__URL set, using in-process memory broker");
            Arc::new(MemoryBroker::new())
        }
    };

    let ctx = BrokerCtx::new().with_trace_id(uuid::Uuid::new_v4().to_string());
    ensure_topology(broker.as_ref(), ctx.clone()).await?;

    let events = Arc::new(EventBus::default());
    let shutdown = CancellationToken::new();

    let loop_handle = {
        let broker = broker.clone();
        let ctx = ctx.clone();
        let events = events.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run(broker, ctx, cfg, events, shutdown).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, draining in-flight messages");
    shutdown.cancel();

    // Give in-flight handlers up to the router consumer's ack-wait to
    // finish before giving up on a clean join (§5 cancellation model).
    match tokio::time::timeout(
        Duration::from_secs(CONSUMER_ROUTER.ack_wait.as_secs()),
        loop_handle,
    )
    .await
    {
        Ok(Ok(Ok(()))) => info!("router loop exited cleanly"),
        Ok(Ok(Err(e))) => error!(error = %e, "router loop exited with error"),
        Ok(Err(e)) => error!(error = %e, "router loop task panicked"),
        Err(_) => error!("router loop did not exit within ack-wait grace period"),
    }

    Ok(())
}
