//! S3-compatible backend for [`crate::store::BlobStore`], and the
//! higher-level `Upload`/`Download`/`List`/`Delete`/`Head` operations
//! from §4.1.
//!
//! SigV4 request signing (canonical request, string-to-sign, the
//! `AWS4-HMAC-SHA256` chain) is handled internally by `aws-sdk-s3` — this
//! module never constructs those headers by hand, it only configures the
//! client and shapes requests/responses to the contract in §4.1/§6.

use std::path::Path;
use std::sync::Arc;

use aws_sdk_s3::primitives::ByteStream as AwsByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as AwsCompletedPart};
use bytes::Bytes;
use chrono::{DateTime, Datelike, Utc};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::config::BlobConfig;
use crate::error::{BlobError, BlobResult};
use crate::store::{BlobStore, GetResult, ObjectHead, PutResult, ResolvedRange, StoreCapabilities};
use crate::types::{ByteRange, ByteStream};

/// Connection parameters for an S3-compatible endpoint. `endpoint_url`
/// is set for non-AWS backends (MinIO, Ceph, etc); left `None` for AWS
/// itself, where the SDK resolves the regional endpoint.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

impl S3Config {
    /// Build from `P8FS_S3_*` environment variables.
    pub fn from_env() -> BlobResult<Self> {
        let bucket = std::env::var("P8FS_S3_BUCKET")
            .map_err(|_| BlobError::invalid("P8FS_S3_BUCKET is not set"))?;
        let region = std::env::var("P8FS_S3_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let endpoint_url = std::env::var("P8FS_S3_ENDPOINT").ok();
        let force_path_style = std::env::var("P8FS_S3_FORCE_PATH_STYLE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(endpoint_url.is_some());

        Ok(Self {
            bucket,
            region,
            endpoint_url,
            force_path_style,
        })
    }
}

/// Outcome of [`S3CompatibleStore::upload`], matching §4.1's `Upload`
/// return shape.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub final_path: String,
    pub size: u64,
    pub content_type: String,
    pub tenant: String,
    pub uploaded_at: DateTime<Utc>,
    pub md5: Option<String>,
    pub sha256: Option<String>,
}

/// Outcome of [`S3CompatibleStore::download`]. `None` signals a 404,
/// exactly as §4.1 specifies.
pub struct DownloadOutcome {
    pub content: Bytes,
    pub size: u64,
    pub content_type: Option<String>,
}

pub struct S3CompatibleStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    config: BlobConfig,
}

impl S3CompatibleStore {
    pub async fn new(s3: S3Config, config: BlobConfig) -> BlobResult<Self> {
        let region = aws_config::Region::new(s3.region.clone());
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);
        if let Some(endpoint) = &s3.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared_config = loader.load().await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if s3.force_path_style {
            s3_builder = s3_builder.force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(s3_builder.build());

        Ok(Self {
            client,
            bucket: s3.bucket,
            config,
        })
    }

    pub async fn from_env() -> BlobResult<Self> {
        Self::new(S3Config::from_env()?, BlobConfig::default()).await
    }

    /// Durable remote path: `uploads/YYYY/MM/DD/<filename>`, using the
    /// current UTC date (§4.1).
    pub fn durable_remote_path(filename: &str) -> String {
        let now = Utc::now();
        format!(
            "uploads/{:04}/{:02}/{:02}/{}",
            now.year(),
            now.month(),
            now.day(),
            filename
        )
    }

    /// `Upload(localPath, remotePath, tenant, contentType, opts)` (§4.1).
    /// Chooses single-PUT or multipart based on `multipart_threshold_bytes`.
    pub async fn upload(
        &self,
        local_path: &Path,
        filename: &str,
        tenant: &str,
        content_type: &str,
    ) -> BlobResult<UploadOutcome> {
        let remote_path = Self::durable_remote_path(filename);
        let metadata = tokio::fs::metadata(local_path).await?;
        let size = metadata.len();

        if size > self.config.max_blob_bytes {
            return Err(BlobError::invalid(format!(
                "blob size {size} exceeds max_blob_bytes {}",
                self.config.max_blob_bytes
            )));
        }

        let (md5, sha256) = if size < self.config.multipart_threshold_bytes {
            self.put_single(local_path, &remote_path, content_type).await?
        } else {
            self.put_multipart(local_path, &remote_path, content_type, size).await?
        };

        Ok(UploadOutcome {
            final_path: remote_path,
            size,
            content_type: content_type.to_string(),
            tenant: tenant.to_string(),
            uploaded_at: Utc::now(),
            md5,
            sha256,
        })
    }

    async fn put_single(
        &self,
        local_path: &Path,
        remote_path: &str,
        content_type: &str,
    ) -> BlobResult<(Option<String>, Option<String>)> {
        let bytes = tokio::fs::read(local_path).await?;

        let md5 = if self.config.content_md5 {
            Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                md5::compute(&bytes).0,
            ))
        } else {
            None
        };

        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(remote_path)
            .content_type(content_type)
            .body(AwsByteStream::from(bytes));

        if let Some(md5) = &md5 {
            req = req.content_md5(md5);
        }

        req.send().await.map_err(BlobError::backend)?;

        Ok((md5, None))
    }

    async fn put_multipart(
        &self,
        local_path: &Path,
        remote_path: &str,
        content_type: &str,
        size: u64,
    ) -> BlobResult<(Option<String>, Option<String>)> {
        let part_size = self.config.upload_rules.part_size;
        let num_parts = size.div_ceil(part_size);

        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(remote_path)
            .content_type(content_type)
            .send()
            .await
            .map_err(BlobError::backend)?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| BlobError::upload_failed("S3 did not return an upload id"))?
            .to_string();

        let bytes = tokio::fs::read(local_path).await?;
        let sha256 = format!("{:x}", Sha256::digest(&bytes));

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_parts));
        let mut tasks = Vec::with_capacity(num_parts as usize);

        for part_index in 0..num_parts {
            let part_number = (part_index + 1) as i32;
            let start = (part_index * part_size) as usize;
            let end = ((part_index + 1) * part_size).min(size) as usize;
            let chunk = Bytes::copy_from_slice(&bytes[start..end]);

            let client = self.client.clone();
            let bucket = self.bucket.clone();
            let key = remote_path.to_string();
            let upload_id = upload_id.clone();
            let permit = semaphore.clone().acquire_owned().await.map_err(BlobError::backend)?;

            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let result = client
                    .upload_part()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(AwsByteStream::from(chunk))
                    .send()
                    .await;
                (part_number, result)
            }));
        }

        let mut completed = Vec::with_capacity(num_parts as usize);
        for task in tasks {
            let (part_number, result) = task.await.map_err(BlobError::backend)?;
            match result {
                Ok(output) => {
                    let etag = output
                        .e_tag()
                        .ok_or_else(|| BlobError::upload_failed("part upload missing ETag"))?
                        .to_string();
                    completed.push(
                        AwsCompletedPart::builder()
                            .part_number(part_number)
                            .e_tag(etag)
                            .build(),
                    );
                }
                Err(err) => {
                    tracing::warn!(%upload_id, part_number, error = %err, "multipart part upload failed, aborting");
                    let _ = self
                        .client
                        .abort_multipart_upload()
                        .bucket(&self.bucket)
                        .key(remote_path)
                        .upload_id(&upload_id)
                        .send()
                        .await;
                    return Err(BlobError::backend(err));
                }
            }
        }

        completed.sort_by_key(|p| p.part_number().unwrap_or_default());

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(remote_path)
            .upload_id(&upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(BlobError::backend)?;

        Ok((None, Some(sha256)))
    }

    /// `Download(remotePath, tenant)` — signed GET; `None` on 404 (§4.1).
    pub async fn download(&self, remote_path: &str) -> BlobResult<Option<DownloadOutcome>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(remote_path)
            .send()
            .await;

        match result {
            Ok(output) => {
                let content_type = output.content_type().map(|s| s.to_string());
                let body = output.body.collect().await.map_err(BlobError::backend)?;
                let bytes = body.into_bytes();
                Ok(Some(DownloadOutcome {
                    size: bytes.len() as u64,
                    content: bytes,
                    content_type,
                }))
            }
            Err(err) => {
                if is_not_found(&err) {
                    Ok(None)
                } else {
                    Err(BlobError::backend(err))
                }
            }
        }
    }

    /// `List(pathPrefix, tenant, recursive, limit)` (§4.1).
    pub async fn list(&self, prefix: &str, recursive: bool, limit: Option<i32>) -> BlobResult<Vec<String>> {
        let mut req = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
        if !recursive {
            req = req.delimiter("/");
        }
        if let Some(limit) = limit {
            req = req.max_keys(limit);
        }
        let output = req.send().await.map_err(BlobError::backend)?;
        Ok(output
            .contents()
            .iter()
            .filter_map(|o| o.key().map(|s| s.to_string()))
            .collect())
    }
}

fn is_not_found(err: &aws_sdk_s3::error::SdkError<impl std::fmt::Debug>) -> bool {
    format!("{err:?}").contains("NotFound") || format!("{err:?}").contains("NoSuchKey")
}

#[async_trait::async_trait]
impl BlobStore for S3CompatibleStore {
    async fn put(&self, key: &str, content_type: Option<&str>, stream: ByteStream) -> BlobResult<PutResult> {
        let mut body = Vec::new();
        let mut stream = stream;
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        let size_bytes = body.len() as u64;

        let mut req = self.client.put_object().bucket(&self.bucket).key(key).body(AwsByteStream::from(body));
        if let Some(ct) = content_type {
            req = req.content_type(ct);
        }
        let output = req.send().await.map_err(BlobError::backend)?;

        Ok(PutResult {
            etag: output.e_tag().map(|s| s.to_string()),
            size_bytes,
            checksum: None,
        })
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> BlobResult<GetResult> {
        let mut req = self.client.get_object().bucket(&self.bucket).key(key);
        if let Some(range) = &range {
            let header = match range.end {
                Some(end) => format!("bytes={}-{}", range.start, end),
                None => format!("bytes={}-", range.start),
            };
            req = req.range(header);
        }

        let output = req.send().await.map_err(|err| {
            if is_not_found(&err) {
                BlobError::not_found(key)
            } else {
                BlobError::backend(err)
            }
        })?;

        let content_type = output.content_type().map(|s| s.to_string());
        let etag = output.e_tag().map(|s| s.to_string());
        let content_range = output.content_range().map(|s| s.to_string());
        let body = output.body.collect().await.map_err(BlobError::backend)?;
        let bytes = body.into_bytes();
        let size_bytes = bytes.len() as u64;

        let resolved_range = match (range, content_range) {
            (Some(requested), Some(_)) => Some(ResolvedRange {
                start: requested.start,
                end: requested.end.unwrap_or(size_bytes.saturating_sub(1)),
                total_size: size_bytes,
            }),
            _ => None,
        };

        Ok(GetResult {
            size_bytes,
            stream: Box::pin(futures_util::stream::once(async move { Ok(bytes) })),
            content_type,
            etag,
            resolved_range,
        })
    }

    async fn head(&self, key: &str) -> BlobResult<Option<ObjectHead>> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(BlobError::backend(err)),
        };

        Ok(Some(ObjectHead {
            size_bytes: output.content_length().unwrap_or_default().max(0) as u64,
            content_type: output.content_type().map(|s| s.to_string()),
            etag: output.e_tag().map(|s| s.to_string()),
            last_modified: output.last_modified().map(|t| t.secs()),
        }))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(BlobError::backend)?;
        Ok(())
    }

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::basic()
            .with_range()
            .with_multipart(Some(self.config.upload_rules.part_size), Some(self.config.max_blob_bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durable_remote_path_is_dated_and_prefixed() {
        let path = S3CompatibleStore::durable_remote_path("doc.pdf");
        assert!(path.starts_with("uploads/"));
        assert!(path.ends_with("doc.pdf"));
        assert_eq!(path.split('/').count(), 5);
    }
}
