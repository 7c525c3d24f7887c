//! SQL dialect differences, isolated to pure string-rendering functions
//! (§9 "provider polymorphism"). `Dialect` itself never touches a
//! connection — `provider::SqlProvider` implementations choose a dialect
//! and execute what it renders.

use p8fs_core::SimilarityMetric;

use crate::filter::{Filter, SelectParams};
use crate::schema::{Row, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    TiDb,
    SqliteVec,
}

impl Dialect {
    /// `INSERT ... ON CONFLICT` (Postgres/SQLite) vs `REPLACE INTO`
    /// (TiDB), exactly mirroring `_build_embedding_upsert_sql`'s branch.
    pub fn upsert_sql(&self, schema: &dyn Schema, row: &Row) -> (String, Vec<String>) {
        let table = schema.table_name();
        let mut columns: Vec<&str> = row.keys().map(String::as_str).collect();
        columns.sort_unstable();
        let placeholders = self.placeholders(columns.len());
        let values: Vec<String> = columns
            .iter()
            .map(|c| row.get(*c).map(|v| v.to_string()).unwrap_or_default())
            .collect();

        let sql = match self {
            Dialect::TiDb => format!(
                "REPLACE INTO {table} ({cols}) VALUES ({ph})",
                cols = columns.join(", "),
                ph = placeholders,
            ),
            Dialect::Postgres | Dialect::SqliteVec => {
                let key_field = schema.key_field().unwrap_or("id");
                let updates: Vec<String> = columns
                    .iter()
                    .filter(|c| **c != key_field)
                    .map(|c| format!("{c} = EXCLUDED.{c}"))
                    .collect();
                format!(
                    "INSERT INTO {table} ({cols}) VALUES ({ph}) ON CONFLICT ({key}) DO UPDATE SET {updates}",
                    cols = columns.join(", "),
                    ph = placeholders,
                    key = key_field,
                    updates = updates.join(", "),
                )
            }
        };
        (sql, values)
    }

    pub fn batch_upsert_sql(&self, schema: &dyn Schema, rows: &[Row]) -> (String, Vec<Vec<String>>) {
        let params = rows
            .iter()
            .map(|row| self.upsert_sql(schema, row).1)
            .collect();
        let template = rows
            .first()
            .map(|row| self.upsert_sql(schema, row).0)
            .unwrap_or_default();
        (template, params)
    }

    pub fn select_sql(&self, schema: &dyn Schema, params: &SelectParams) -> (String, Vec<String>) {
        let table = schema.table_name();
        let columns = params
            .fields
            .as_ref()
            .map(|f| f.join(", "))
            .unwrap_or_else(|| "*".to_string());

        let mut bound = Vec::new();
        let mut clauses = Vec::new();
        for f in &params.filters {
            clauses.push(self.render_filter(f, &mut bound));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let order_clause = if params.order_by.is_empty() {
            String::new()
        } else {
            let terms: Vec<String> = params
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.field, if o.descending { "DESC" } else { "ASC" }))
                .collect();
            format!(" ORDER BY {}", terms.join(", "))
        };

        let limit_clause = params.limit.map(|l| format!(" LIMIT {l}")).unwrap_or_default();
        let offset_clause = params.offset.map(|o| format!(" OFFSET {o}")).unwrap_or_default();

        let sql = format!(
            "SELECT {columns} FROM {table}{where_clause}{order_clause}{limit_clause}{offset_clause}"
        );
        (sql, bound)
    }

    fn render_filter(&self, filter: &Filter, bound: &mut Vec<String>) -> String {
        let ph = |bound: &mut Vec<String>, value: String| -> String {
            bound.push(value);
            self.placeholder_at(bound.len())
        };
        match filter {
            Filter::Eq(f, v) => format!("{f} = {}", ph(bound, v.to_string())),
            Filter::In(f, vs) => {
                let placeholders: Vec<String> =
                    vs.iter().map(|v| ph(bound, v.to_string())).collect();
                format!("{f} IN ({})", placeholders.join(", "))
            }
            Filter::Like(f, pattern) => format!("{f} LIKE {}", ph(bound, pattern.clone())),
            Filter::Contains(f, v) => match self {
                Dialect::TiDb => format!("JSON_CONTAINS({f}, {})", ph(bound, v.to_string())),
                Dialect::Postgres | Dialect::SqliteVec => {
                    format!("{f} @> {}", ph(bound, v.to_string()))
                }
            },
            Filter::Gt(f, v) => format!("{f} > {}", ph(bound, v.to_string())),
            Filter::Gte(f, v) => format!("{f} >= {}", ph(bound, v.to_string())),
            Filter::Lt(f, v) => format!("{f} < {}", ph(bound, v.to_string())),
            Filter::Lte(f, v) => format!("{f} <= {}", ph(bound, v.to_string())),
        }
    }

    /// Nearest-neighbour query against `{table}_embeddings`, joined back
    /// to the primary table, tenant-scoped and threshold-filtered (§4.5
    /// `SemanticSearch(query_text, limit, threshold, metric, field_name?)`).
    /// `threshold` is a lower bound on similarity for cosine/inner-product
    /// (higher is better) and an upper bound on distance for l2 (lower is
    /// better). The score alias isn't visible to a `WHERE` clause in the
    /// same `SELECT`, so the threshold filter wraps the scored query in an
    /// outer `SELECT`.
    pub fn semantic_search_sql(
        &self,
        schema: &dyn Schema,
        field_name: Option<&str>,
        metric: SimilarityMetric,
        threshold: f32,
        limit: i64,
        tenant: Option<&str>,
    ) -> String {
        let table = schema.table_name();
        let embeddings_table = format!("embeddings.{table}_embeddings");
        let (expr, score_col) = self.distance_expr(metric);
        let mut where_clauses = vec![];
        if let Some(f) = field_name {
            where_clauses.push(format!("e.field_name = '{f}'"));
        }
        if tenant.is_some() {
            where_clauses.push("e.tenant_id = $tenant".to_string());
        }
        let where_clause = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };
        let threshold_cmp = if matches!(metric, SimilarityMetric::Cosine | SimilarityMetric::InnerProduct) {
            ">="
        } else {
            "<="
        };
        format!(
            "SELECT * FROM (SELECT t.*, {expr} AS {score_col} FROM {embeddings_table} e \
             JOIN {table} t ON t.id = e.entity_id{where_clause}) scored \
             WHERE {score_col} {threshold_cmp} {threshold} \
             ORDER BY {score_col} {order} LIMIT {limit}",
            order = if matches!(metric, SimilarityMetric::Cosine | SimilarityMetric::InnerProduct) {
                "DESC"
            } else {
                "ASC"
            },
        )
    }

    fn distance_expr(&self, metric: SimilarityMetric) -> (&'static str, &'static str) {
        match (self, metric) {
            (Dialect::Postgres, SimilarityMetric::Cosine) => ("1 - (e.embedding_vector <=> $query)", "similarity_score"),
            (Dialect::Postgres, SimilarityMetric::L2) => ("e.embedding_vector <-> $query", "distance_score"),
            (Dialect::Postgres, SimilarityMetric::InnerProduct) => ("(e.embedding_vector <#> $query) * -1", "similarity_score"),
            (Dialect::TiDb, SimilarityMetric::Cosine) => ("1 - VEC_COSINE_DISTANCE(e.embedding_vector, $query)", "similarity_score"),
            (Dialect::TiDb, SimilarityMetric::L2) => ("VEC_L2_DISTANCE(e.embedding_vector, $query)", "distance_score"),
            (Dialect::TiDb, SimilarityMetric::InnerProduct) => ("VEC_NEGATIVE_INNER_PRODUCT(e.embedding_vector, $query) * -1", "similarity_score"),
            (Dialect::SqliteVec, SimilarityMetric::Cosine) => ("1 - vec_distance_cosine(e.embedding_vector, $query)", "similarity_score"),
            (Dialect::SqliteVec, SimilarityMetric::L2) => ("vec_distance_l2(e.embedding_vector, $query)", "distance_score"),
            (Dialect::SqliteVec, SimilarityMetric::InnerProduct) => ("vec_distance_l2(e.embedding_vector, $query) * -1", "similarity_score"),
        }
    }

    pub fn embedding_upsert_sql(&self) -> &'static str {
        match self {
            Dialect::TiDb => {
                "REPLACE INTO {table} (id, entity_id, field_name, embedding_provider, \
                 embedding_vector, vector_dimension, tenant_id, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, VEC_FROM_TEXT($5), $6, $7, NOW(), NOW())"
            }
            Dialect::Postgres | Dialect::SqliteVec => {
                "INSERT INTO {table} (id, entity_id, field_name, embedding_provider, \
                 embedding_vector, vector_dimension, tenant_id, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW()) \
                 ON CONFLICT (entity_id, field_name, tenant_id) DO UPDATE SET \
                 embedding_provider = EXCLUDED.embedding_provider, \
                 embedding_vector = EXCLUDED.embedding_vector, \
                 vector_dimension = EXCLUDED.vector_dimension, updated_at = NOW()"
            }
        }
    }

    fn placeholders(&self, n: usize) -> String {
        (1..=n).map(|i| self.placeholder_at(i)).collect::<Vec<_>>().join(", ")
    }

    fn placeholder_at(&self, i: usize) -> String {
        match self {
            Dialect::TiDb => "?".to_string(),
            Dialect::Postgres | Dialect::SqliteVec => format!("${i}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EmbeddingField;
    use serde_json::json;

    struct DummySchema;
    impl Schema for DummySchema {
        fn table_name(&self) -> &'static str {
            "chunks"
        }
        fn key_field(&self) -> Option<&'static str> {
            Some("id")
        }
        fn embedding_fields(&self) -> &'static [EmbeddingField] {
            &[EmbeddingField { field_name: "content", provider: "openai" }]
        }
        fn tenant_isolated(&self) -> bool {
            true
        }
    }

    #[test]
    fn postgres_upsert_uses_on_conflict() {
        let mut row = Row::new();
        row.insert("id".to_string(), json!("abc"));
        row.insert("content".to_string(), json!("hello"));
        let (sql, _) = Dialect::Postgres.upsert_sql(&DummySchema, &row);
        assert!(sql.contains("ON CONFLICT (id)"));
    }

    #[test]
    fn tidb_upsert_uses_replace_into() {
        let mut row = Row::new();
        row.insert("id".to_string(), json!("abc"));
        let (sql, _) = Dialect::TiDb.upsert_sql(&DummySchema, &row);
        assert!(sql.starts_with("REPLACE INTO chunks"));
    }

    #[test]
    fn select_sql_renders_descending_order_and_limit() {
        let params = SelectParams::new()
            .with_filter(Filter::Eq("tenant_id".into(), json!("t1")))
            .with_order_by("-created_at")
            .with_limit(10);
        let (sql, bound) = Dialect::Postgres.select_sql(&DummySchema, &params);
        assert!(sql.contains("WHERE tenant_id = $1"));
        assert!(sql.contains("ORDER BY created_at DESC"));
        assert!(sql.contains("LIMIT 10"));
        assert_eq!(bound.len(), 1);
    }
}
