//! `Schema` implementations for the entities C4 persists, plus the
//! `Row` conversions the repository's generic upsert path needs.

use p8fs_core::{Chunk, File, InlineEdge, Moment};
use serde_json::{Map, Value};

use crate::schema::{EmbeddingField, Row, Schema};

fn validate_graph_paths(row: &Row) -> Result<(), String> {
    let edges: Vec<InlineEdge> = match row.get("graph_paths") {
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| e.to_string())?,
        None => return Ok(()),
    };
    for edge in &edges {
        edge.validate()?;
    }
    Ok(())
}

pub fn to_row<T: serde::Serialize>(entity: &T) -> Row {
    match serde_json::to_value(entity).unwrap_or(Value::Null) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn from_row<T: serde::de::DeserializeOwned>(row: Row) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(row))
}

pub struct FileSchema;

impl Schema for FileSchema {
    fn table_name(&self) -> &'static str {
        "files"
    }

    fn key_field(&self) -> Option<&'static str> {
        Some("id")
    }

    fn natural_key_field(&self) -> Option<&'static str> {
        Some("blob_uri")
    }

    fn embedding_fields(&self) -> &'static [EmbeddingField] {
        &[]
    }

    fn tenant_isolated(&self) -> bool {
        true
    }
}

pub struct ChunkSchema;

impl Schema for ChunkSchema {
    fn table_name(&self) -> &'static str {
        "chunks"
    }

    fn key_field(&self) -> Option<&'static str> {
        Some("id")
    }

    fn embedding_fields(&self) -> &'static [EmbeddingField] {
        &[EmbeddingField { field_name: "content", provider: "default" }]
    }

    fn tenant_isolated(&self) -> bool {
        true
    }

    fn validate(&self, row: &Row) -> Result<(), String> {
        let chunk: Chunk = from_row(row.clone()).map_err(|e| e.to_string())?;
        chunk.validate()?;
        validate_graph_paths(row)
    }
}

pub struct MomentSchema;

impl Schema for MomentSchema {
    fn table_name(&self) -> &'static str {
        "moments"
    }

    fn key_field(&self) -> Option<&'static str> {
        Some("id")
    }

    fn embedding_fields(&self) -> &'static [EmbeddingField] {
        &[]
    }

    fn tenant_isolated(&self) -> bool {
        true
    }

    fn validate(&self, row: &Row) -> Result<(), String> {
        let _moment: Moment = from_row(row.clone()).map_err(|e| e.to_string())?;
        validate_graph_paths(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p8fs_core::{ChunkCategory, TenantId};
    use uuid::Uuid;

    #[test]
    fn file_round_trips_through_row() {
        let file = File {
            id: Uuid::new_v4(),
            tenant_id: TenantId::from("acme"),
            blob_uri: "uploads/2026/07/27/report.pdf".into(),
            byte_size: 1024,
            content_type: "application/pdf".into(),
            content_hash: None,
            uploaded_at: chrono::Utc::now(),
            metadata: Default::default(),
        };
        let row = to_row(&file);
        let back: File = from_row(row).unwrap();
        assert_eq!(back.id, file.id);
        assert_eq!(back.blob_uri, file.blob_uri);
    }

    #[test]
    fn chunk_round_trips_through_row() {
        let chunk = Chunk {
            id: Uuid::new_v4(),
            tenant_id: TenantId::from("acme"),
            file_id: Uuid::new_v4(),
            name: "chunk-0".into(),
            category: ChunkCategory::DocumentChunk,
            content: "hello world".into(),
            summary: None,
            source_uri: None,
            ordinal: 0,
            graph_paths: vec![],
            metadata: Default::default(),
            created_at: chrono::Utc::now(),
        };
        let row = to_row(&chunk);
        let back: Chunk = from_row(row).unwrap();
        assert_eq!(back.content, chunk.content);
    }
}
