//! The shared data model flowing through C1–C5: files, chunks, moments,
//! inline graph edges, embedding records, KV mappings and the storage
//! event that ties ingestion to processing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque tenant scoping identifier. Every entity in the pipeline carries
/// one and every query filters by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A stored binary object. Identity is deterministic: `UUIDv5(DNS,
/// "{tenant}:{blob_path}")`, so re-processing the same path never
/// produces a second row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub blob_uri: String,
    pub byte_size: u64,
    pub content_type: String,
    pub content_hash: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl File {
    /// `file_id = UUIDv5(DNS, "{tenant}:{path}")` — invariant #2 in §8.
    pub fn derive_id(tenant: &TenantId, blob_path: &str) -> Uuid {
        crate::ids::uuid5_dns(&format!("{}:{}", tenant.as_str(), blob_path))
    }
}

/// Category of a processor-produced [`Chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkCategory {
    DocumentChunk,
    Summary,
    Table,
    Image,
    Other,
}

/// A processor-produced fragment of extracted content, persisted as a
/// Resource. `ordinal` is unique per (file, tenant); `content` must be
/// non-empty when `category` is `DocumentChunk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub file_id: Uuid,
    pub name: String,
    pub category: ChunkCategory,
    pub content: String,
    pub summary: Option<String>,
    pub source_uri: Option<String>,
    pub ordinal: u32,
    pub graph_paths: Vec<InlineEdge>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// `chunk_id = UUIDv5(DNS, "{file_id}-{extraction_method}-{ordinal}")`
    /// — invariant #3 in §8.
    pub fn derive_id(file_id: Uuid, extraction_method: &str, ordinal: u32) -> Uuid {
        crate::ids::uuid5_dns(&format!("{file_id}-{extraction_method}-{ordinal}"))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.category == ChunkCategory::DocumentChunk && self.content.is_empty() {
            return Err("document_chunk content must be non-empty".into());
        }
        Ok(())
    }
}

/// Time-bounded experiential segment. Shares identity/lifecycle rules
/// with [`Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moment {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub file_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub emotion_tags: Vec<String>,
    pub topic_tags: Vec<String>,
    pub present_persons: Vec<String>,
    pub speakers: Vec<String>,
    pub graph_paths: Vec<InlineEdge>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// An embedded directed edge stored on a source entity. Edges on a
/// single entity are unique on `(dst, rel_type)`; on duplicate insert the
/// higher-weight edge wins (invariant #7, scenario 4 in §8).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineEdge {
    pub dst: String,
    pub rel_type: String,
    pub weight: f32,
    pub properties: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl InlineEdge {
    pub const DST_ENTITY_TYPE_KEY: &'static str = "dst_entity_type";

    pub fn dst_entity_type(&self) -> Option<&str> {
        self.properties.get(Self::DST_ENTITY_TYPE_KEY).and_then(|v| v.as_str())
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(format!("edge weight {} out of range [0.0, 1.0]", self.weight));
        }
        if self.dst_entity_type().is_none() {
            return Err("edge properties must carry dst_entity_type".into());
        }
        Ok(())
    }
}

/// Merge a new batch of edges into an existing list, applying the
/// dedup-on-`(dst, rel_type)`-higher-weight-wins rule uniformly —
/// resolves the open question in §9 by applying the rule to every
/// caller, deterministic or LLM-originated alike.
pub fn merge_edges(existing: &mut Vec<InlineEdge>, incoming: Vec<InlineEdge>) {
    for edge in incoming {
        if let Some(slot) = existing
            .iter_mut()
            .find(|e| e.dst == edge.dst && e.rel_type == edge.rel_type)
        {
            if edge.weight > slot.weight {
                *slot = edge;
            }
        } else {
            existing.push(edge);
        }
    }
}

/// Nearest-neighbour distance metric offered by [`crate::model`] callers
/// of semantic search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Cosine,
    L2,
    InnerProduct,
}

/// One row per (entity, embedding-eligible field, tenant). Unique on
/// `(entity_id, field_name, tenant_id)`; re-upsert replaces in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub entity_id: Uuid,
    pub field_name: String,
    pub embedding_provider: String,
    pub vector: Vec<f32>,
    pub dimension: u32,
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmbeddingRecord {
    pub fn validate(&self) -> Result<(), String> {
        if self.vector.len() as u32 != self.dimension {
            return Err(format!(
                "vector length {} does not match declared dimension {}",
                self.vector.len(),
                self.dimension
            ));
        }
        Ok(())
    }
}

/// Reverse-index entry. Key format `{tenant}/{label}/{table_name}`;
/// `entity_ids` is append-only-with-dedup on each upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyValueMapping {
    pub entity_ids: Vec<Uuid>,
    pub table_name: String,
    pub entity_type: String,
}

impl KeyValueMapping {
    pub fn key(tenant: &TenantId, label: &str, table_name: &str) -> String {
        format!("{}/{}/{}", tenant.as_str(), label, table_name)
    }

    pub fn add_entity(&mut self, id: Uuid) {
        if !self.entity_ids.contains(&id) {
            self.entity_ids.push(id);
        }
    }
}

/// Lifecycle of a [`StorageEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageEventType {
    Create,
    Update,
    Delete,
}

/// The message traversing C2 → C3 → C4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEvent {
    pub event_type: StorageEventType,
    pub path: String,
    pub tenant_id: TenantId,
    pub size: u64,
    pub content_type: String,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_merge_dedups_and_keeps_higher_weight() {
        let mut props = HashMap::new();
        props.insert("dst_entity_type".to_string(), serde_json::json!("resource"));

        let mut existing = vec![InlineEdge {
            dst: "A".into(),
            rel_type: "r".into(),
            weight: 0.5,
            properties: props.clone(),
            created_at: Utc::now(),
        }];

        merge_edges(
            &mut existing,
            vec![
                InlineEdge {
                    dst: "A".into(),
                    rel_type: "r".into(),
                    weight: 0.8,
                    properties: props.clone(),
                    created_at: Utc::now(),
                },
                InlineEdge {
                    dst: "B".into(),
                    rel_type: "r".into(),
                    weight: 0.3,
                    properties: props,
                    created_at: Utc::now(),
                },
            ],
        );

        assert_eq!(existing.len(), 2);
        let a = existing.iter().find(|e| e.dst == "A").unwrap();
        assert_eq!(a.weight, 0.8);
    }

    #[test]
    fn file_id_is_deterministic() {
        let tenant = TenantId::from("t1");
        let id1 = File::derive_id(&tenant, "/buckets/t1/uploads/2025/01/01/doc.pdf");
        let id2 = File::derive_id(&tenant, "/buckets/t1/uploads/2025/01/01/doc.pdf");
        assert_eq!(id1, id2);
    }
}
