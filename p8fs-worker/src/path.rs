//! Blob path normalization (§4.4 step 3): a `StorageEvent.path` may
//! arrive as `/buckets/{tenant}/{key}`, `buckets/{tenant}/{key}`, or a
//! bare `{key}` relative to `uploads/`. C1 always expects the bare key.

pub fn normalize_blob_path(tenant_id: &str, path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    let tenant_prefix = format!("buckets/{tenant_id}/");
    if let Some(rest) = trimmed.strip_prefix(&tenant_prefix) {
        return rest.to_string();
    }
    if trimmed.starts_with("uploads/") {
        return trimmed.to_string();
    }
    format!("uploads/{trimmed}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_slash_and_bucket_prefix() {
        assert_eq!(
            normalize_blob_path("acme", "/buckets/acme/uploads/2026/07/27/report.pdf"),
            "uploads/2026/07/27/report.pdf"
        );
    }

    #[test]
    fn strips_bucket_prefix_without_leading_slash() {
        assert_eq!(
            normalize_blob_path("acme", "buckets/acme/uploads/2026/07/27/report.pdf"),
            "uploads/2026/07/27/report.pdf"
        );
    }

    #[test]
    fn bare_key_is_prefixed_with_uploads() {
        assert_eq!(normalize_blob_path("acme", "report.pdf"), "uploads/report.pdf");
    }

    #[test]
    fn bare_key_already_under_uploads_is_unchanged() {
        assert_eq!(
            normalize_blob_path("acme", "uploads/2026/07/27/report.pdf"),
            "uploads/2026/07/27/report.pdf"
        );
    }
}
