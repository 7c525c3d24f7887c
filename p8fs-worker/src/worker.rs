//! The per-tier storage worker loop (§4.4): pull one event, resolve and
//! download its blob, run it through a content processor, upsert the
//! File + Chunk rows, ack. Single in-flight message per worker; scaling
//! is horizontal, by running more worker processes against the same
//! durable consumer.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use p8fs_blob::store::BlobStore;
use p8fs_broker::{Broker, BrokerCtx, Delivery};
use p8fs_core::{Chunk, Classify, File, PipelineEvent, StorageEvent};
use p8fs_core::EventBus;
use p8fs_repo::Repository;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::path::normalize_blob_path;
use crate::processor::{ProcessedChunk, ProcessorOptions, ProcessorRegistry};

pub struct WorkerDeps {
    pub broker: Arc<dyn Broker>,
    pub blob_store: Arc<dyn BlobStore>,
    pub processors: Arc<ProcessorRegistry>,
    pub files: Arc<Repository<p8fs_repo::FileSchema>>,
    pub chunks: Arc<Repository<p8fs_repo::ChunkSchema>>,
    pub events: Arc<EventBus>,
}

pub async fn run(deps: WorkerDeps, cfg: WorkerConfig, shutdown: CancellationToken) -> WorkerResult<()> {
    let ctx = BrokerCtx::new();
    let stream = cfg.tier.stream().name;
    let consumer = cfg.tier.consumer().name;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                info!(tier = cfg.tier.name(), "worker shutting down");
                return Ok(());
            }
            pulled = deps.broker.pull(ctx.clone(), stream, consumer, cfg.fetch_batch_size, cfg.fetch_timeout) => {
                let deliveries = pulled.map_err(WorkerError::Broker)?;
                for delivery in deliveries {
                    if let Err(e) = handle_one(&deps, &cfg, &ctx, &delivery).await {
                        warn!(error = %e, tier = cfg.tier.name(), "event handling failed");
                    }
                }
            }
        }
    }
}

#[instrument(skip(deps, cfg, ctx, delivery), fields(tier = cfg.tier.name()))]
async fn handle_one(
    deps: &WorkerDeps,
    cfg: &WorkerConfig,
    ctx: &BrokerCtx,
    delivery: &Delivery,
) -> WorkerResult<()> {
    let stream = cfg.tier.stream().name;
    let consumer = cfg.tier.consumer().name;

    let event: StorageEvent = match serde_json::from_slice(&delivery.raw_payload) {
        Ok(event) => event,
        Err(e) => {
            deps.broker.nak(ctx.clone(), stream, consumer, delivery).await.map_err(WorkerError::Broker)?;
            return Err(WorkerError::MalformedEvent(e.to_string()));
        }
    };

    match process_event(deps, &event).await {
        Ok(()) => {
            deps.broker.ack(ctx.clone(), stream, consumer, delivery).await.map_err(WorkerError::Broker)?;
            deps.events.publish(PipelineEvent::Acked { tenant_id: event.tenant_id.to_string(), path: event.path.clone(), at: Utc::now() });
            Ok(())
        }
        Err(e) if e.kind() == p8fs_core::ErrorKind::NotFound => {
            // Stale event referencing a blob that's gone — ack, don't retry.
            warn!(error = %e, path = %event.path, "blob not found, acking stale event");
            deps.broker.ack(ctx.clone(), stream, consumer, delivery).await.map_err(WorkerError::Broker)?;
            Ok(())
        }
        Err(e) if e.kind().should_retry() => {
            deps.broker.nak(ctx.clone(), stream, consumer, delivery).await.map_err(WorkerError::Broker)?;
            deps.events.publish(PipelineEvent::Nacked { tenant_id: event.tenant_id.to_string(), path: event.path.clone(), reason: e.to_string(), at: Utc::now() });
            Err(e)
        }
        Err(e) => {
            // Validation/unrecoverable-after-download: record and ack so
            // it doesn't loop forever (§4.4 step 8, §7 table).
            error!(error = %e, path = %event.path, "unrecoverable processing error, acking");
            deps.broker.ack(ctx.clone(), stream, consumer, delivery).await.map_err(WorkerError::Broker)?;
            Ok(())
        }
    }
}

async fn process_event(deps: &WorkerDeps, event: &StorageEvent) -> WorkerResult<()> {
    let remote_path = normalize_blob_path(event.tenant_id.as_str(), &event.path);

    let (bytes, content_type) = match download(deps.blob_store.as_ref(), &remote_path).await? {
        Some(result) => result,
        None => return Err(WorkerError::BlobNotFound(remote_path)),
    };
    deps.events.publish(PipelineEvent::Downloaded { tenant_id: event.tenant_id.to_string(), path: event.path.clone(), bytes: bytes.len() as u64, at: Utc::now() });

    let content_type = content_type.unwrap_or_else(|| event.content_type.clone());
    let processor = deps
        .processors
        .select(&content_type, &event.path)
        .ok_or_else(|| WorkerError::NoProcessor { content_type: content_type.clone(), path: event.path.clone() })?;

    let document = processor
        .process(&bytes, &event.path, &content_type, &ProcessorOptions::default())
        .await?;

    let tenant = event.tenant_id.clone();
    let file_id = File::derive_id(&tenant, &remote_path);
    let file = File {
        id: file_id,
        tenant_id: tenant.clone(),
        blob_uri: remote_path.clone(),
        byte_size: bytes.len() as u64,
        content_type: content_type.clone(),
        content_hash: None,
        uploaded_at: Utc::now(),
        metadata: [
            ("word_count".to_string(), serde_json::json!(document.metadata.word_count)),
            ("confidence".to_string(), serde_json::json!(document.metadata.confidence)),
            ("extraction_method".to_string(), serde_json::json!(document.metadata.extraction_method)),
            ("title".to_string(), serde_json::json!(document.metadata.title)),
        ]
        .into_iter()
        .collect(),
    };

    deps.files.upsert(vec![p8fs_repo::models::to_row(&file)], false).await.map_err(WorkerError::Repo)?;
    deps.events.publish(PipelineEvent::Upserted { tenant_id: event.tenant_id.to_string(), entity_id: file_id.to_string(), table: "files".to_string(), at: Utc::now() });

    let chunk_rows = build_chunk_rows(&tenant, file_id, &document.metadata.extraction_method, document.chunks);
    let chunk_count = chunk_rows.len();
    deps.chunks.upsert(chunk_rows, true).await.map_err(WorkerError::Repo)?;
    deps.events.publish(PipelineEvent::Chunked { tenant_id: event.tenant_id.to_string(), file_id: file_id.to_string(), chunk_count, at: Utc::now() });

    Ok(())
}

fn build_chunk_rows(tenant: &p8fs_core::TenantId, file_id: Uuid, extraction_method: &str, chunks: Vec<ProcessedChunk>) -> Vec<p8fs_repo::Row> {
    chunks
        .into_iter()
        .map(|c| {
            let chunk = Chunk {
                id: Chunk::derive_id(file_id, extraction_method, c.ordinal),
                tenant_id: tenant.clone(),
                file_id,
                name: format!("{file_id}-{}", c.ordinal),
                category: c.category,
                content: c.content,
                summary: c.summary,
                source_uri: None,
                ordinal: c.ordinal,
                graph_paths: vec![],
                metadata: Default::default(),
                created_at: Utc::now(),
            };
            p8fs_repo::models::to_row(&chunk)
        })
        .collect()
}

/// Reads the blob fully via [`BlobStore::get`], translating `NotFound`
/// into `Ok(None)` per §4.4 step 4 ("on 404, log and ACK").
async fn download(store: &dyn BlobStore, key: &str) -> WorkerResult<Option<(Bytes, Option<String>)>> {
    match store.get(key, None).await {
        Ok(result) => {
            let mut buf = Vec::with_capacity(result.size_bytes as usize);
            let mut stream = result.stream;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| WorkerError::Internal(e.to_string()))?;
                buf.extend_from_slice(&chunk);
            }
            Ok(Some((Bytes::from(buf), result.content_type)))
        }
        Err(e) if e.kind() == p8fs_core::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WorkerError::Blob(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use p8fs_blob::store::{GetResult, ObjectHead, PutResult, StoreCapabilities};
    use p8fs_blob::{BlobError, BlobResult, ByteRange, ByteStream};
    use p8fs_broker::{ensure_topology, MemoryBroker, Tier};
    use p8fs_repo::{FileSchema, ChunkSchema, MemoryKvStore, MemoryProvider};
    use std::collections::HashMap;
    use std::sync::RwLock;
    use tokio_stream::wrappers::ReceiverStream;

    struct MemoryBlobStore {
        objects: RwLock<HashMap<String, (Bytes, String)>>,
    }

    impl MemoryBlobStore {
        fn new() -> Self {
            Self { objects: RwLock::new(HashMap::new()) }
        }

        fn insert(&self, key: &str, bytes: Bytes, content_type: &str) {
            self.objects.write().unwrap().insert(key.to_string(), (bytes, content_type.to_string()));
        }
    }

    #[async_trait]
    impl BlobStore for MemoryBlobStore {
        async fn put(&self, _key: &str, _content_type: Option<&str>, _stream: ByteStream) -> BlobResult<PutResult> {
            unimplemented!("not exercised by worker tests")
        }

        async fn get(&self, key: &str, _range: Option<ByteRange>) -> BlobResult<GetResult> {
            let objects = self.objects.read().unwrap();
            let (bytes, content_type) = objects.get(key).cloned().ok_or_else(|| BlobError::NotFound { id: key.to_string() })?;
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx.send(Ok(bytes.clone())).await;
            Ok(GetResult {
                stream: Box::pin(ReceiverStream::new(rx)),
                size_bytes: bytes.len() as u64,
                content_type: Some(content_type),
                etag: None,
                resolved_range: None,
            })
        }

        async fn head(&self, _key: &str) -> BlobResult<Option<ObjectHead>> {
            unimplemented!("not exercised by worker tests")
        }

        async fn delete(&self, _key: &str) -> BlobResult<()> {
            unimplemented!("not exercised by worker tests")
        }

        fn capabilities(&self) -> StoreCapabilities {
            StoreCapabilities::basic()
        }
    }

    fn test_deps(blob: Arc<MemoryBlobStore>) -> WorkerDeps {
        let broker = Arc::new(MemoryBroker::new());
        let sql = Arc::new(MemoryProvider::new());
        let kv = Arc::new(MemoryKvStore::new());
        let events = Arc::new(EventBus::default());
        WorkerDeps {
            broker,
            blob_store: blob,
            processors: Arc::new(ProcessorRegistry::new().register(Box::new(crate::processor::PlainTextProcessor))),
            files: Arc::new(Repository::new(FileSchema, sql.clone(), kv.clone())),
            chunks: Arc::new(Repository::new(ChunkSchema, sql, kv).with_embedding_provider(
                Arc::new(p8fs_repo::LocalHashEmbeddingProvider::new(4)) as Arc<dyn p8fs_repo::EmbeddingProvider>,
            )),
            events,
        }
    }

    #[tokio::test]
    async fn processes_event_and_upserts_file_and_chunks() {
        let blob_store = Arc::new(MemoryBlobStore::new());
        blob_store.insert("uploads/acme/notes.txt", Bytes::from_static(b"hello world this is a test document"), "text/plain");
        let deps = test_deps(blob_store);

        let ctx = BrokerCtx::new();
        ensure_topology(deps.broker.as_ref(), ctx.clone()).await.unwrap();

        let event = StorageEvent {
            event_type: p8fs_core::StorageEventType::Create,
            path: "uploads/acme/notes.txt".to_string(),
            tenant_id: p8fs_core::TenantId::from("acme"),
            size: 36,
            content_type: "text/plain".to_string(),
            timestamp: 0.0,
            source: None,
        };
        let payload = serde_json::to_vec(&event).unwrap();
        deps.broker.publish(ctx.clone(), Tier::Small.subject(), payload).await.unwrap();

        let cfg = WorkerConfig { tier: Tier::Small, ..WorkerConfig::default() };
        let delivery = deps
            .broker
            .pull(ctx.clone(), cfg.tier.stream().name, cfg.tier.consumer().name, 1, std::time::Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(delivery.len(), 1);

        handle_one(&deps, &cfg, &ctx, &delivery[0]).await.unwrap();

        let tenant = p8fs_core::TenantId::from("acme");
        let file_id = File::derive_id(&tenant, "uploads/acme/notes.txt");
        let row = deps.files.get(&file_id.to_string()).await.unwrap();
        assert!(row.is_some());

        let chunks = deps.chunks.select(p8fs_repo::SelectParams::new().with_filter(p8fs_repo::Filter::Eq("file_id".into(), serde_json::json!(file_id.to_string())))).await.unwrap();
        assert!(!chunks.is_empty());
    }

    #[tokio::test]
    async fn missing_blob_is_acked_not_retried() {
        let blob_store = Arc::new(MemoryBlobStore::new());
        let deps = test_deps(blob_store);
        let ctx = BrokerCtx::new();
        ensure_topology(deps.broker.as_ref(), ctx.clone()).await.unwrap();

        let event = StorageEvent {
            event_type: p8fs_core::StorageEventType::Create,
            path: "uploads/acme/missing.txt".to_string(),
            tenant_id: p8fs_core::TenantId::from("acme"),
            size: 10,
            content_type: "text/plain".to_string(),
            timestamp: 0.0,
            source: None,
        };
        let payload = serde_json::to_vec(&event).unwrap();
        deps.broker.publish(ctx.clone(), Tier::Small.subject(), payload).await.unwrap();

        let cfg = WorkerConfig { tier: Tier::Small, ..WorkerConfig::default() };
        let delivery = deps
            .broker
            .pull(ctx.clone(), cfg.tier.stream().name, cfg.tier.consumer().name, 1, std::time::Duration::from_secs(1))
            .await
            .unwrap();

        handle_one(&deps, &cfg, &ctx, &delivery[0]).await.unwrap();

        let redelivery = deps
            .broker
            .pull(ctx.clone(), cfg.tier.stream().name, cfg.tier.consumer().name, 1, std::time::Duration::from_millis(50))
            .await
            .unwrap();
        assert!(redelivery.is_empty(), "acked event must not be redelivered");
    }
}
