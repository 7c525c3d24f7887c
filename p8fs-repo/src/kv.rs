//! Entity-key index: `{tenant}/{name}/{table}` -> set of entity ids,
//! grounded in `BaseRepository._populate_entity_key_index`'s append-or-
//! create-mapping logic. The index is best-effort (§4.5 step 3): a
//! failure here is logged by the caller, never rolled back.

use async_trait::async_trait;
use p8fs_core::KeyValueMapping;
use tokio::sync::RwLock;

use std::collections::HashMap;

use crate::error::RepoResult;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> RepoResult<Option<KeyValueMapping>>;
    async fn put(&self, key: &str, mapping: KeyValueMapping) -> RepoResult<()>;

    /// Read-modify-write helper: fetch the existing mapping (or start a
    /// fresh one for `table_name`/`entity_type`), add `entity_id`, and
    /// write it back. Mirrors the source's "append if exists, else
    /// create" branch.
    async fn add_entity(
        &self,
        key: &str,
        entity_id: uuid::Uuid,
        table_name: &str,
        entity_type: &str,
    ) -> RepoResult<()> {
        let mut mapping = self.get(key).await?.unwrap_or_else(|| KeyValueMapping {
            entity_ids: Vec::new(),
            table_name: table_name.to_string(),
            entity_type: entity_type.to_string(),
        });
        mapping.add_entity(entity_id);
        self.put(key, mapping).await
    }
}

#[derive(Default)]
pub struct MemoryKvStore {
    inner: RwLock<HashMap<String, KeyValueMapping>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> RepoResult<Option<KeyValueMapping>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, mapping: KeyValueMapping) -> RepoResult<()> {
        self.inner.write().await.insert(key.to_string(), mapping);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p8fs_core::TenantId;

    #[tokio::test]
    async fn add_entity_creates_then_appends() {
        let kv = MemoryKvStore::new();
        let tenant = TenantId::from("acme");
        let key = KeyValueMapping::key(&tenant, "report.pdf", "files");
        let id1 = uuid::Uuid::new_v4();
        let id2 = uuid::Uuid::new_v4();

        kv.add_entity(&key, id1, "files", "File").await.unwrap();
        kv.add_entity(&key, id2, "files", "File").await.unwrap();

        let mapping = kv.get(&key).await.unwrap().unwrap();
        assert_eq!(mapping.entity_ids.len(), 2);
        assert!(mapping.entity_ids.contains(&id1));
        assert!(mapping.entity_ids.contains(&id2));
    }
}
