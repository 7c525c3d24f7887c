//! The `Schema` trait replaces the source's class-level model reflection
//! (table name, key field, embedding fields, tenant flag) with an
//! explicit per-entity implementation, per §9's "dynamic schema
//! reflection" design note. Upsert-SQL construction is then a pure
//! function of `(schema, row)`.

use serde_json::{Map, Value};

/// A row is a JSON object — the common denominator across every dialect
/// and across every model the repository manages.
pub type Row = Map<String, Value>;

/// One embedding-eligible field and the provider that embeds it.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddingField {
    pub field_name: &'static str,
    pub provider: &'static str,
}

pub trait Schema: Send + Sync {
    fn table_name(&self) -> &'static str;

    /// The primary-key column name, used by upsert's conflict target
    /// and by `get`/`delete`.
    fn key_field(&self) -> Option<&'static str>;

    /// The field whose value (scoped by tenant) seeds a deterministic
    /// `UUIDv5` id when the caller omits `id` (§4.5 step 1). `None`
    /// means a fresh `UUIDv4` is always used instead.
    fn natural_key_field(&self) -> Option<&'static str> {
        None
    }

    fn embedding_fields(&self) -> &'static [EmbeddingField];

    /// Whether rows of this schema carry `tenant_id` and are subject to
    /// tenant-scoped filtering.
    fn tenant_isolated(&self) -> bool;

    /// Enforces the §3 data-model invariants for this entity (e.g. a
    /// `document_chunk`'s content must be non-empty, an inline edge's
    /// weight must fall in `[0.0, 1.0]` and carry `dst_entity_type`).
    /// Called by `Repository::upsert` before the SQL write; a failure
    /// here becomes `RepoError::Validation` and aborts the upsert
    /// (ack-not-retry at the worker). Default is no-op for schemas with
    /// no extra invariants beyond what the column types already enforce.
    fn validate(&self, _row: &Row) -> Result<(), String> {
        Ok(())
    }
}

pub fn row_string(row: &Row, field: &str) -> Option<String> {
    row.get(field).and_then(|v| v.as_str()).map(str::to_string)
}
