use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use p8fs_blob::{BlobConfig, S3CompatibleStore, S3Config};
use p8fs_blob::store::BlobStore;
use p8fs_broker::{ensure_topology, Broker, BrokerCtx, MemoryBroker, NatsBroker};
use p8fs_core::EventBus;
use p8fs_repo::{ChunkSchema, EmbeddingProvider, FileSchema, LocalHashEmbeddingProvider, MemoryKvStore, MemoryProvider, OpenAiEmbeddingProvider, Repository, SqlProvider, SqlxProvider};
use p8fs_worker::{run, PlainTextProcessor, ProcessorRegistry, WorkerConfig, WorkerDeps};
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

    let worker_cfg = WorkerConfig::from_env();
    let repo_cfg = p8fs_repo::RepoConfig::from_env();
    info!(tier = worker_cfg.tier.name(), test_mode = worker_cfg.test_mode, "starting storage worker");

    let broker: Arc<dyn Broker> = match &worker_cfg.nats_url {
        Some(url) => {
            info!(%url, "connecting to NATS JetStream");
            Arc::new(NatsBroker::connect(url).await?)
        }
        None => {
            info!("no P8FS_WORKER__NATS__URL set, using in-process memory broker");
            Arc::new(MemoryBroker::new())
        }
    };
    let ctx = BrokerCtx::new().with_trace_id(uuid::Uuid::new_v4().to_string());
    ensure_topology(broker.as_ref(), ctx).await?;

    let blob_store: Arc<dyn BlobStore> = {
        let s3_config = S3Config::from_env()?;
        let blob_config = BlobConfig::default();
        Arc::new(S3CompatibleStore::new(s3_config, blob_config).await?)
    };

    let sql: Arc<dyn SqlProvider> = match &repo_cfg.database_url {
        Some(url) => {
            info!(%url, dialect = ?repo_cfg.dialect, "connecting repository to SQL backend");
            Arc::new(SqlxProvider::connect(url, repo_cfg.dialect).await?)
        }
        None => {
            info!("no P8FS_REPO__DATABASE__URL set, using in-process memory repository");
            Arc::new(MemoryProvider::new())
        }
    };
    let kv = Arc::new(MemoryKvStore::new());

    let embedding_provider: Arc<dyn EmbeddingProvider> = match &repo_cfg.openai_api_key {
        Some(key) => Arc::new(OpenAiEmbeddingProvider::new(
            "default",
            repo_cfg.openai_embedding_model.clone(),
            repo_cfg.embedding_dimensions,
            key.clone(),
        )),
        None => Arc::new(LocalHashEmbeddingProvider::new(repo_cfg.embedding_dimensions)),
    };

    let events = Arc::new(EventBus::default());
    let files = Arc::new(Repository::new(FileSchema, sql.clone(), kv.clone()).with_events(events.clone()));
    let chunks = Arc::new(
        Repository::new(ChunkSchema, sql, kv)
            .with_embedding_provider(embedding_provider)
            .with_events(events.clone()),
    );

    let deps = WorkerDeps {
        broker: broker.clone(),
        blob_store,
        processors: Arc::new(ProcessorRegistry::new().register(Box::new(PlainTextProcessor))),
        files,
        chunks,
        events,
    };

    let shutdown = CancellationToken::new();
    let ack_wait = worker_cfg.tier.consumer().ack_wait;
    let loop_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { run(deps, worker_cfg, shutdown).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("ctrl-c received, draining in-flight message");
    shutdown.cancel();

    match tokio::time::timeout(Duration::from_secs(ack_wait.as_secs()), loop_handle).await {
        Ok(Ok(Ok(()))) => info!("worker loop exited cleanly"),
        Ok(Ok(Err(e))) => error!(error = %e, "worker loop exited with error"),
        Ok(Err(e)) => error!(error = %e, "worker loop task panicked"),
        Err(_) => error!("worker loop did not exit within ack-wait grace period"),
    }

    Ok(())
}
