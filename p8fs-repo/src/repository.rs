//! The dual-indexing repository, grounded in `BaseRepository`: `upsert`
//! writes the SQL row first (hard failure aborts the whole call), then
//! best-effort generates embeddings and populates the entity-key KV
//! index (failures there are logged, never rolled back). `get`/`select`/
//! `semantic_search`/`query`/`delete`/`execute` mirror the same names.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use p8fs_core::{EventBus, KeyValueMapping, PipelineEvent, SimilarityMetric, TenantId};
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::embeddings::EmbeddingProvider;
use crate::error::{RepoError, RepoResult};
use crate::filter::{Filter, SelectParams};
use crate::kv::KvStore;
use crate::provider::SqlProvider;
use crate::schema::{Row, Schema};

/// Dispatch hint for [`Repository::query`], mirroring the source's
/// `query(hint)` entry point. Graph/hybrid traversal is out of scope
/// here (§4.5 design notes) and returns `RepoError::NotImplemented`.
#[derive(Debug, Clone)]
pub enum QueryHint {
    Select(SelectParams),
    SemanticSearch {
        query_text: String,
        field_name: Option<String>,
        metric: SimilarityMetric,
        threshold: f32,
        limit: i64,
    },
    Graph,
    Hybrid,
}

pub struct Repository<S: Schema> {
    schema: S,
    sql: Arc<dyn SqlProvider>,
    kv: Arc<dyn KvStore>,
    embedding_providers: HashMap<String, Arc<dyn EmbeddingProvider>>,
    events: Option<Arc<EventBus>>,
}

impl<S: Schema> Repository<S> {
    pub fn new(schema: S, sql: Arc<dyn SqlProvider>, kv: Arc<dyn KvStore>) -> Self {
        Self { schema, sql, kv, embedding_providers: HashMap::new(), events: None }
    }

    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// `get` delegates to `select` with an equality filter on the key
    /// field, as the source's `get` does.
    pub async fn get(&self, id: &str) -> RepoResult<Option<Row>> {
        let key_field = self.schema.key_field().ok_or_else(|| RepoError::Config("schema has no key field".into()))?;
        let params = SelectParams::new().with_filter(Filter::Eq(key_field.to_string(), Value::String(id.to_string()))).with_limit(1);
        let rows = self.select(params).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn select(&self, params: SelectParams) -> RepoResult<Vec<Row>> {
        self.sql.select(&self.schema, &params).await
    }

    /// Embeds `query_text` through the field's declared provider, then
    /// issues a dialect-appropriate nearest-neighbour query (§4.5
    /// `SemanticSearch(query_text, limit, threshold, metric, field_name?)`).
    /// `field_name` selects which embedding-eligible field to search;
    /// omitted, the schema's first declared field is used.
    pub async fn semantic_search(
        &self,
        query_text: &str,
        field_name: Option<&str>,
        metric: SimilarityMetric,
        threshold: f32,
        limit: i64,
        tenant_id: Option<&str>,
    ) -> RepoResult<Vec<Row>> {
        let field = match field_name {
            Some(name) => self
                .schema
                .embedding_fields()
                .iter()
                .find(|f| f.field_name == name)
                .ok_or_else(|| RepoError::Config(format!("schema has no embedding field named {name}")))?,
            None => self
                .schema
                .embedding_fields()
                .first()
                .ok_or_else(|| RepoError::Config("schema has no embedding fields".into()))?,
        };
        let provider = self.embedding_providers.get(field.provider).ok_or_else(|| RepoError::Embedding {
            provider: field.provider.to_string(),
            reason: "no provider registered".into(),
        })?;
        let mut vectors = provider.embed(&[query_text.to_string()]).await?;
        let query_vector = vectors.pop().ok_or_else(|| RepoError::Embedding {
            provider: field.provider.to_string(),
            reason: "provider returned no vectors".into(),
        })?;
        self.sql
            .semantic_search(&self.schema, Some(field.field_name), &query_vector, metric, threshold, limit, tenant_id)
            .await
    }

    pub async fn query(&self, hint: QueryHint) -> RepoResult<Vec<Row>> {
        match hint {
            QueryHint::Select(params) => self.select(params).await,
            QueryHint::SemanticSearch { query_text, field_name, metric, threshold, limit } => {
                self.semantic_search(&query_text, field_name.as_deref(), metric, threshold, limit, None).await
            }
            QueryHint::Graph => Err(RepoError::NotImplemented("graph".into())),
            QueryHint::Hybrid => Err(RepoError::NotImplemented("hybrid".into())),
        }
    }

    pub async fn delete(&self, id: &str) -> RepoResult<()> {
        self.sql.delete(&self.schema, id).await
    }

    pub async fn execute(&self, sql: &str) -> RepoResult<Vec<Row>> {
        self.sql.execute(sql).await
    }

    /// The dual-indexing write path (§4.5 step-by-step upsert). `rows`
    /// may omit `id`; if `natural_key_field` is set and present, the id
    /// is a deterministic `UUIDv5(tenant:value)`, else a fresh `UUIDv4`.
    #[instrument(skip(self, rows), fields(table = self.schema.table_name(), count = rows.len()))]
    pub async fn upsert(&self, rows: Vec<Row>, create_embeddings: bool) -> RepoResult<Vec<Row>> {
        let mut written = Vec::with_capacity(rows.len());
        for mut row in rows {
            self.assign_id(&mut row)?;
            self.schema.validate(&row).map_err(RepoError::Validation)?;
            let tenant_id = row.get("tenant_id").and_then(|v| v.as_str()).map(str::to_string);
            let persisted = self.sql.upsert(&self.schema, row).await?;
            let entity_id = persisted
                .get(self.schema.key_field().unwrap_or("id"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            if let Some(events) = &self.events {
                events.publish(PipelineEvent::Upserted {
                    tenant_id: tenant_id.clone().unwrap_or_default(),
                    entity_id: entity_id.clone(),
                    table: self.schema.table_name().to_string(),
                    at: Utc::now(),
                });
            }

            if create_embeddings {
                if let Err(e) = self.index_embeddings(&persisted, &entity_id, tenant_id.as_deref()).await {
                    warn!(error = %e, entity_id, "embedding indexing failed, continuing");
                    self.publish_indexed(tenant_id.as_deref(), &entity_id, false, Some(e.to_string()));
                } else {
                    self.publish_indexed(tenant_id.as_deref(), &entity_id, true, None);
                }
            }

            if let Err(e) = self.index_entity_key(&persisted, &entity_id, tenant_id.as_deref()).await {
                warn!(error = %e, entity_id, "entity-key indexing failed, continuing");
            }

            written.push(persisted);
        }
        Ok(written)
    }

    fn assign_id(&self, row: &mut Row) -> RepoResult<()> {
        let key_field = match self.schema.key_field() {
            Some(f) => f,
            None => return Ok(()),
        };
        if row.get(key_field).and_then(|v| v.as_str()).is_some() {
            return Ok(());
        }
        let id = match self.schema.natural_key_field().and_then(|natural| row.get(natural)).and_then(|v| v.as_str()) {
            Some(natural_value) => {
                let tenant = row.get("tenant_id").and_then(|v| v.as_str()).unwrap_or("");
                p8fs_core::ids::uuid5_from_key(tenant, natural_value)
            }
            None => Uuid::new_v4(),
        };
        row.insert(key_field.to_string(), Value::String(id.to_string()));
        Ok(())
    }

    async fn index_embeddings(&self, row: &Row, entity_id: &str, tenant_id: Option<&str>) -> RepoResult<()> {
        for field in self.schema.embedding_fields() {
            let text = match row.get(field.field_name).and_then(|v| v.as_str()) {
                Some(t) if !t.is_empty() => t,
                _ => continue,
            };
            let provider = self
                .embedding_providers
                .get(field.provider)
                .ok_or_else(|| RepoError::Embedding { provider: field.provider.to_string(), reason: "no provider registered".into() })?;
            let vectors = provider.embed(&[text.to_string()]).await?;
            let vector = vectors.into_iter().next().ok_or_else(|| RepoError::Embedding {
                provider: field.provider.to_string(),
                reason: "provider returned no vectors".into(),
            })?;

            let record = p8fs_core::EmbeddingRecord {
                entity_id: Uuid::parse_str(entity_id).unwrap_or_else(|_| Uuid::nil()),
                field_name: field.field_name.to_string(),
                embedding_provider: provider.name().to_string(),
                vector: vector.clone(),
                dimension: provider.dimensions() as u32,
                tenant_id: TenantId::from(tenant_id.unwrap_or("system")),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            record.validate().map_err(|e| RepoError::Embedding { provider: field.provider.to_string(), reason: e })?;

            self.sql
                .upsert_embedding(self.schema.table_name(), entity_id, field.field_name, provider.name(), &vector, tenant_id)
                .await?;
        }
        Ok(())
    }

    /// Populates `{tenant}/{name}/{table}` for the entity's own name and
    /// `{tenant}/{edge.dst}/resource` for every inline edge, exactly as
    /// `_populate_entity_key_index` does.
    async fn index_entity_key(&self, row: &Row, entity_id: &str, tenant_id: Option<&str>) -> RepoResult<()> {
        let tenant = TenantId::from(tenant_id.unwrap_or("system"));
        let entity_id = Uuid::parse_str(entity_id).map_err(|e| RepoError::Kv(e.to_string()))?;
        let table = self.schema.table_name();

        if let Some(name) = row.get("name").and_then(|v| v.as_str()) {
            let key = KeyValueMapping::key(&tenant, name, table);
            self.kv.add_entity(&key, entity_id, table, table).await.map_err(|e| RepoError::Kv(e.to_string()))?;
        }

        if let Some(edges) = row.get("graph_paths").and_then(|v| v.as_array()) {
            for edge in edges {
                if let Some(dst) = edge.get("dst").and_then(|v| v.as_str()) {
                    let key = KeyValueMapping::key(&tenant, dst, "resource");
                    let dst_entity_type = edge
                        .get("properties")
                        .and_then(|p| p.get("dst_entity_type"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("entity");
                    self.kv.add_entity(&key, entity_id, table, dst_entity_type).await.map_err(|e| RepoError::Kv(e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    fn publish_indexed(&self, tenant_id: Option<&str>, entity_id: &str, ok: bool, detail: Option<String>) {
        if let Some(events) = &self.events {
            events.publish(PipelineEvent::Indexed {
                tenant_id: tenant_id.unwrap_or_default().to_string(),
                entity_id: entity_id.to_string(),
                ok,
                detail,
                at: Utc::now(),
            });
        }
    }
}

/// Automatically scopes every filter and written row to a tenant,
/// mirroring the source's tenant-bound repository subclass.
pub struct TenantRepository<S: Schema> {
    inner: Repository<S>,
    tenant_id: String,
}

impl<S: Schema> TenantRepository<S> {
    pub fn new(inner: Repository<S>, tenant_id: impl Into<String>) -> Self {
        Self { inner, tenant_id: tenant_id.into() }
    }

    pub async fn upsert(&self, mut rows: Vec<Row>, create_embeddings: bool) -> RepoResult<Vec<Row>> {
        if self.inner.schema.tenant_isolated() {
            for row in &mut rows {
                row.insert("tenant_id".to_string(), Value::String(self.tenant_id.clone()));
            }
        }
        self.inner.upsert(rows, create_embeddings).await
    }

    pub async fn select(&self, mut params: SelectParams) -> RepoResult<Vec<Row>> {
        if self.inner.schema.tenant_isolated() {
            params = params.with_filter(Filter::Eq("tenant_id".to_string(), Value::String(self.tenant_id.clone())));
        }
        self.inner.select(params).await
    }

    pub async fn get(&self, id: &str) -> RepoResult<Option<Row>> {
        self.inner.get(id).await
    }

    pub async fn delete(&self, id: &str) -> RepoResult<()> {
        self.inner.delete(id).await
    }
}

/// System-scoped repository: no tenant injection, used by cross-tenant
/// administrative operations.
pub struct SystemRepository<S: Schema> {
    inner: Repository<S>,
}

impl<S: Schema> SystemRepository<S> {
    pub fn new(inner: Repository<S>) -> Self {
        Self { inner }
    }

    pub async fn upsert(&self, rows: Vec<Row>, create_embeddings: bool) -> RepoResult<Vec<Row>> {
        self.inner.upsert(rows, create_embeddings).await
    }

    pub async fn select(&self, params: SelectParams) -> RepoResult<Vec<Row>> {
        self.inner.select(params).await
    }

    pub async fn get(&self, id: &str) -> RepoResult<Option<Row>> {
        self.inner.get(id).await
    }

    pub async fn delete(&self, id: &str) -> RepoResult<()> {
        self.inner.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalHashEmbeddingProvider;
    use crate::kv::MemoryKvStore;
    use crate::models::ChunkSchema;
    use crate::provider::MemoryProvider;
    use serde_json::json;

    fn repo() -> Repository<ChunkSchema> {
        let sql = Arc::new(MemoryProvider::new());
        let kv = Arc::new(MemoryKvStore::new());
        Repository::new(ChunkSchema, sql, kv)
            .with_embedding_provider(Arc::new(LocalHashEmbeddingProvider::new(8)) as Arc<dyn EmbeddingProvider>)
    }

    fn embedding_provider_named(name: &str) -> Arc<dyn EmbeddingProvider> {
        struct Named(LocalHashEmbeddingProvider, &'static str);
        #[async_trait::async_trait]
        impl EmbeddingProvider for Named {
            fn name(&self) -> &str {
                self.1
            }
            fn dimensions(&self) -> usize {
                self.0.dimensions()
            }
            fn max_input_length(&self) -> usize {
                self.0.max_input_length()
            }
            async fn embed(&self, texts: &[String]) -> RepoResult<Vec<Vec<f32>>> {
                self.0.embed(texts).await
            }
        }
        Arc::new(Named(LocalHashEmbeddingProvider::new(8), "default"))
    }

    #[tokio::test]
    async fn upsert_assigns_random_id_when_absent() {
        let sql = Arc::new(MemoryProvider::new());
        let kv = Arc::new(MemoryKvStore::new());
        let repo = Repository::new(ChunkSchema, sql, kv).with_embedding_provider(embedding_provider_named("default"));

        let mut row = Row::new();
        row.insert("name".to_string(), json!("chunk-a"));
        row.insert("content".to_string(), json!("hello world"));
        row.insert("tenant_id".to_string(), json!("acme"));

        let written = repo.upsert(vec![row], true).await.unwrap();
        assert_eq!(written.len(), 1);
        assert!(written[0].get("id").and_then(|v| v.as_str()).is_some());

        let key = KeyValueMapping::key(&TenantId::from("acme"), "chunk-a", "chunks");
        let mapping = repo.kv().get(&key).await.unwrap();
        assert!(mapping.is_some());
    }

    #[tokio::test]
    async fn upsert_continues_after_embedding_failure() {
        let repo = repo();
        let mut row = Row::new();
        row.insert("name".to_string(), json!("chunk-b"));
        row.insert("content".to_string(), json!("no matching provider"));
        row.insert("tenant_id".to_string(), json!("acme"));
        let written = repo.upsert(vec![row], true).await.unwrap();
        assert_eq!(written.len(), 1);
    }

    #[tokio::test]
    async fn semantic_search_embeds_query_text_and_filters_by_tenant() {
        let sql = Arc::new(MemoryProvider::new());
        let kv = Arc::new(MemoryKvStore::new());
        let repo = Repository::new(ChunkSchema, sql, kv).with_embedding_provider(embedding_provider_named("default"));

        let mut row_t1 = Row::new();
        row_t1.insert("name".to_string(), json!("chunk-t1"));
        row_t1.insert("content".to_string(), json!("hello world"));
        row_t1.insert("tenant_id".to_string(), json!("t1"));
        repo.upsert(vec![row_t1], true).await.unwrap();

        let mut row_t2 = Row::new();
        row_t2.insert("name".to_string(), json!("chunk-t2"));
        row_t2.insert("content".to_string(), json!("hello world"));
        row_t2.insert("tenant_id".to_string(), json!("t2"));
        repo.upsert(vec![row_t2], true).await.unwrap();

        let results = repo
            .semantic_search("hello world", None, SimilarityMetric::Cosine, 0.0, 10, Some("t1"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("tenant_id").unwrap(), "t1");
    }

    #[tokio::test]
    async fn tenant_repository_injects_tenant_id() {
        let sql = Arc::new(MemoryProvider::new());
        let kv = Arc::new(MemoryKvStore::new());
        let repo = Repository::new(ChunkSchema, sql, kv);
        let tenant_repo = TenantRepository::new(repo, "acme");

        let mut row = Row::new();
        row.insert("name".to_string(), json!("chunk-c"));
        row.insert("content".to_string(), json!("hi"));
        let written = tenant_repo.upsert(vec![row], false).await.unwrap();
        assert_eq!(written[0].get("tenant_id").unwrap(), "acme");
    }
}
