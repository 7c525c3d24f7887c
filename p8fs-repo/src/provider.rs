//! Storage backends behind the dual-indexing repository. `SqlProvider`
//! is the seam the source's different database adapters sat behind;
//! `MemoryProvider` exists for tests, `SqlxProvider` is the real one,
//! built on `sqlx`'s `Any` driver so the same code path runs against
//! Postgres, MySQL/TiDB, or SQLite depending on the connection URL
//! scheme, with `dialect::Dialect` only varying the SQL text.

use async_trait::async_trait;
use p8fs_core::SimilarityMetric;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row as SqlxRow};
use tokio::sync::RwLock;

use std::collections::HashMap;

use crate::dialect::Dialect;
use crate::error::{RepoError, RepoResult};
use crate::filter::{Filter, SelectParams};
use crate::schema::{Row, Schema};

#[async_trait]
pub trait SqlProvider: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn upsert(&self, schema: &dyn Schema, row: Row) -> RepoResult<Row>;
    async fn select(&self, schema: &dyn Schema, params: &SelectParams) -> RepoResult<Vec<Row>>;
    async fn delete(&self, schema: &dyn Schema, id: &str) -> RepoResult<()>;
    async fn execute(&self, sql: &str) -> RepoResult<Vec<Row>>;

    async fn upsert_embedding(
        &self,
        table: &str,
        entity_id: &str,
        field_name: &str,
        provider_name: &str,
        vector: &[f32],
        tenant_id: Option<&str>,
    ) -> RepoResult<()>;

    /// `threshold` keeps rows with similarity >= threshold (cosine,
    /// inner product) or distance <= threshold (l2).
    async fn semantic_search(
        &self,
        schema: &dyn Schema,
        field_name: Option<&str>,
        query_vector: &[f32],
        metric: SimilarityMetric,
        threshold: f32,
        limit: i64,
        tenant_id: Option<&str>,
    ) -> RepoResult<Vec<Row>>;
}

/// In-process backend: filters/orders in Rust rather than rendering SQL,
/// so tests exercise the repository's dual-indexing logic without a
/// live database.
#[derive(Default)]
pub struct MemoryProvider {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    embeddings: RwLock<HashMap<String, Vec<(String, String, String, Vec<f32>, Option<String>)>>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(row: &Row, filter: &Filter) -> bool {
        let value = row.get(filter.field());
        match filter {
            Filter::Eq(_, v) => value == Some(v),
            Filter::In(_, vs) => value.map(|v| vs.contains(v)).unwrap_or(false),
            Filter::Like(_, pattern) => value
                .and_then(|v| v.as_str())
                .map(|s| s.contains(pattern.trim_matches('%')))
                .unwrap_or(false),
            Filter::Contains(_, needle) => value
                .and_then(|v| v.as_array())
                .map(|arr| arr.contains(needle))
                .unwrap_or(false),
            Filter::Gt(_, v) => compare(value, v) == Some(std::cmp::Ordering::Greater),
            Filter::Gte(_, v) => matches!(compare(value, v), Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
            Filter::Lt(_, v) => compare(value, v) == Some(std::cmp::Ordering::Less),
            Filter::Lte(_, v) => matches!(compare(value, v), Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
        }
    }
}

fn compare(a: Option<&serde_json::Value>, b: &serde_json::Value) -> Option<std::cmp::Ordering> {
    let a = a?.as_f64()?;
    let b = b.as_f64()?;
    a.partial_cmp(&b)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

#[async_trait]
impl SqlProvider for MemoryProvider {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn upsert(&self, schema: &dyn Schema, row: Row) -> RepoResult<Row> {
        let key_field = schema.key_field().unwrap_or("id");
        let id = row_id(&row, key_field)?;
        let mut tables = self.tables.write().await;
        let entries = tables.entry(schema.table_name().to_string()).or_default();
        if let Some(existing) = entries.iter_mut().find(|r| row_id(r, key_field).ok().as_deref() == Some(id.as_str())) {
            *existing = row;
        } else {
            entries.push(row);
        }
        Ok(entries
            .iter()
            .find(|r| row_id(r, key_field).ok().as_deref() == Some(id.as_str()))
            .cloned()
            .unwrap())
    }

    async fn select(&self, schema: &dyn Schema, params: &SelectParams) -> RepoResult<Vec<Row>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Row> = tables
            .get(schema.table_name())
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| params.filters.iter().all(|f| Self::matches(row, f)))
            .collect();

        for order in params.order_by.iter().rev() {
            rows.sort_by(|a, b| {
                let ord = a
                    .get(&order.field)
                    .map(|v| v.to_string())
                    .cmp(&b.get(&order.field).map(|v| v.to_string()));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        if let Some(offset) = params.offset {
            rows = rows.into_iter().skip(offset as usize).collect();
        }
        if let Some(limit) = params.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn delete(&self, schema: &dyn Schema, id: &str) -> RepoResult<()> {
        let key_field = schema.key_field().unwrap_or("id");
        let mut tables = self.tables.write().await;
        if let Some(entries) = tables.get_mut(schema.table_name()) {
            entries.retain(|r| row_id(r, key_field).ok().as_deref() != Some(id));
        }
        Ok(())
    }

    async fn execute(&self, _sql: &str) -> RepoResult<Vec<Row>> {
        Err(RepoError::NotImplemented("raw execute against MemoryProvider".into()))
    }

    async fn upsert_embedding(
        &self,
        table: &str,
        entity_id: &str,
        field_name: &str,
        provider_name: &str,
        vector: &[f32],
        tenant_id: Option<&str>,
    ) -> RepoResult<()> {
        let mut embeddings = self.embeddings.write().await;
        let entries = embeddings.entry(table.to_string()).or_default();
        entries.retain(|(e, f, _, _, t)| !(e == entity_id && f == field_name && t.as_deref() == tenant_id));
        entries.push((
            entity_id.to_string(),
            field_name.to_string(),
            provider_name.to_string(),
            vector.to_vec(),
            tenant_id.map(str::to_string),
        ));
        Ok(())
    }

    async fn semantic_search(
        &self,
        schema: &dyn Schema,
        field_name: Option<&str>,
        query_vector: &[f32],
        metric: SimilarityMetric,
        threshold: f32,
        limit: i64,
        tenant_id: Option<&str>,
    ) -> RepoResult<Vec<Row>> {
        let embeddings = self.embeddings.read().await;
        let tables = self.tables.read().await;
        let table_rows = tables.get(schema.table_name()).cloned().unwrap_or_default();
        let key_field = schema.key_field().unwrap_or("id");

        let mut scored: Vec<(f32, Row)> = embeddings
            .get(schema.table_name())
            .into_iter()
            .flatten()
            .filter(|(_, f, _, _, t)| {
                field_name.map(|want| want == f).unwrap_or(true) && tenant_id == t.as_deref()
            })
            .filter_map(|(entity_id, _, _, vector, _)| {
                let row = table_rows
                    .iter()
                    .find(|r| row_id(r, key_field).ok().as_deref() == Some(entity_id.as_str()))?;
                let value = match metric {
                    SimilarityMetric::Cosine => cosine_similarity(query_vector, vector),
                    SimilarityMetric::InnerProduct => query_vector.iter().zip(vector).map(|(a, b)| a * b).sum(),
                    SimilarityMetric::L2 => l2_distance(query_vector, vector),
                };
                let passes = match metric {
                    SimilarityMetric::Cosine | SimilarityMetric::InnerProduct => value >= threshold,
                    SimilarityMetric::L2 => value <= threshold,
                };
                passes.then(|| (value, row.clone()))
            })
            .collect();

        scored.sort_by(|a, b| match metric {
            SimilarityMetric::Cosine | SimilarityMetric::InnerProduct => {
                b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal)
            }
            SimilarityMetric::L2 => a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal),
        });
        scored.truncate(limit.max(0) as usize);
        Ok(scored.into_iter().map(|(_, row)| row).collect())
    }
}

fn row_id(row: &Row, key_field: &str) -> RepoResult<String> {
    row.get(key_field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| RepoError::Validation(format!("row missing {key_field}")))
}

/// Real backend over `sqlx::Any`. Connection-pool management is generic
/// across dialects; only the SQL text rendered by `Dialect` differs.
pub struct SqlxProvider {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxProvider {
    pub async fn connect(url: &str, dialect: Dialect) -> RepoResult<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| RepoError::Sql(e.to_string()))?;
        Ok(Self { pool, dialect })
    }
}

#[async_trait]
impl SqlProvider for SqlxProvider {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn upsert(&self, schema: &dyn Schema, row: Row) -> RepoResult<Row> {
        let (sql, values) = self.dialect.upsert_sql(schema, &row);
        let mut query = sqlx::query(&sql);
        for v in &values {
            query = query.bind(v.clone());
        }
        query.execute(&self.pool).await.map_err(|e| RepoError::Sql(e.to_string()))?;
        Ok(row)
    }

    async fn select(&self, schema: &dyn Schema, params: &SelectParams) -> RepoResult<Vec<Row>> {
        let (sql, bound) = self.dialect.select_sql(schema, params);
        let mut query = sqlx::query(&sql);
        for v in &bound {
            query = query.bind(v.clone());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(|e| RepoError::Sql(e.to_string()))?;
        rows.into_iter().map(sqlx_row_to_json).collect()
    }

    async fn delete(&self, schema: &dyn Schema, id: &str) -> RepoResult<()> {
        let key_field = schema.key_field().unwrap_or("id");
        let sql = format!("DELETE FROM {} WHERE {key_field} = {}", schema.table_name(), self.dialect.placeholder_for_test());
        sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Sql(e.to_string()))?;
        Ok(())
    }

    async fn execute(&self, sql: &str) -> RepoResult<Vec<Row>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Sql(e.to_string()))?;
        rows.into_iter().map(sqlx_row_to_json).collect()
    }

    async fn upsert_embedding(
        &self,
        table: &str,
        entity_id: &str,
        field_name: &str,
        provider_name: &str,
        vector: &[f32],
        tenant_id: Option<&str>,
    ) -> RepoResult<()> {
        let sql = self.dialect.embedding_upsert_sql().replace("{table}", &format!("{table}_embeddings"));
        let vector_literal = format!("[{}]", vector.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","));
        sqlx::query(&sql)
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(entity_id)
            .bind(field_name)
            .bind(provider_name)
            .bind(vector_literal)
            .bind(vector.len() as i64)
            .bind(tenant_id.unwrap_or_default())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Sql(e.to_string()))?;
        Ok(())
    }

    async fn semantic_search(
        &self,
        schema: &dyn Schema,
        field_name: Option<&str>,
        query_vector: &[f32],
        metric: SimilarityMetric,
        threshold: f32,
        limit: i64,
        tenant_id: Option<&str>,
    ) -> RepoResult<Vec<Row>> {
        let sql = self.dialect.semantic_search_sql(schema, field_name, metric, threshold, limit, tenant_id);
        let vector_literal = format!("[{}]", query_vector.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","));
        let rows = sqlx::query(&sql)
            .bind(vector_literal)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Sql(e.to_string()))?;
        rows.into_iter().map(sqlx_row_to_json).collect()
    }
}

impl Dialect {
    fn placeholder_for_test(&self) -> &'static str {
        match self {
            Dialect::TiDb => "?",
            Dialect::Postgres | Dialect::SqliteVec => "$1",
        }
    }
}

fn sqlx_row_to_json(row: sqlx::any::AnyRow) -> RepoResult<Row> {
    let mut map = serde_json::Map::new();
    for column in row.columns() {
        let name = column.name();
        let value: Option<String> = row.try_get(name).ok();
        map.insert(name.to_string(), serde_json::json!(value));
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct DummySchema;
    impl Schema for DummySchema {
        fn table_name(&self) -> &'static str {
            "things"
        }
        fn key_field(&self) -> Option<&'static str> {
            Some("id")
        }
        fn embedding_fields(&self) -> &'static [crate::schema::EmbeddingField] {
            &[]
        }
        fn tenant_isolated(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn memory_provider_upserts_and_selects() {
        let provider = MemoryProvider::new();
        let mut row = Row::new();
        row.insert("id".to_string(), json!("a1"));
        row.insert("name".to_string(), json!("alpha"));
        provider.upsert(&DummySchema, row).await.unwrap();

        let results = provider
            .select(&DummySchema, &SelectParams::new().with_filter(Filter::Eq("id".into(), json!("a1"))))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("name").unwrap(), "alpha");
    }

    #[tokio::test]
    async fn memory_provider_semantic_search_ranks_by_cosine() {
        let provider = MemoryProvider::new();
        let mut row = Row::new();
        row.insert("id".to_string(), json!("a1"));
        provider.upsert(&DummySchema, row).await.unwrap();
        provider
            .upsert_embedding("things", "a1", "content", "local-hash", &[1.0, 0.0], None)
            .await
            .unwrap();

        let results = provider
            .semantic_search(&DummySchema, Some("content"), &[1.0, 0.0], SimilarityMetric::Cosine, 0.0, 5, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn memory_provider_semantic_search_drops_rows_below_threshold() {
        let provider = MemoryProvider::new();
        let mut row = Row::new();
        row.insert("id".to_string(), json!("a1"));
        provider.upsert(&DummySchema, row).await.unwrap();
        provider
            .upsert_embedding("things", "a1", "content", "local-hash", &[0.0, 1.0], None)
            .await
            .unwrap();

        let results = provider
            .semantic_search(&DummySchema, Some("content"), &[1.0, 0.0], SimilarityMetric::Cosine, 0.5, 5, None)
            .await
            .unwrap();
        assert!(results.is_empty(), "orthogonal vector has cosine similarity 0, below threshold 0.5");
    }
}
