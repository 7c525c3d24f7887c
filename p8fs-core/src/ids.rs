//! Deterministic ID derivation shared by [`crate::model::File`] and
//! [`crate::model::Chunk`], and by anything else in the pipeline that
//! needs the `UUIDv5(DNS, name)` convention.

use uuid::Uuid;

/// `UUIDv5` of the DNS namespace over `name`, exactly as C4/C5 derive
/// File and Chunk identities (§4.4, §4.5, invariants #2–#3 in §8).
pub fn uuid5_dns(name: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, name.as_bytes())
}

/// Derive a primary-key UUID from a tenant-scoped key, as C5's upsert
/// pipeline does when the caller omits `id` but the schema declares a
/// `key` field (§4.5 step 1).
pub fn uuid5_from_key(tenant: &str, key: &str) -> Uuid {
    uuid5_dns(&format!("{tenant}:{key}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic() {
        assert_eq!(uuid5_dns("t1:/a/b/c"), uuid5_dns("t1:/a/b/c"));
        assert_ne!(uuid5_dns("t1:/a/b/c"), uuid5_dns("t1:/a/b/d"));
    }
}
