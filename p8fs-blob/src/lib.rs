//! # p8fs-blob: blob storage client for the P8FS pipeline
//!
//! `p8fs-blob` is the C1 Blob Store Client: streaming-first, range-friendly
//! access to an S3-compatible object store, with multipart upload/download
//! above an 8 MiB threshold (§4.1).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use p8fs_blob::prelude::*;
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let store = p8fs_blob::S3CompatibleStore::from_env().await?;
//! let outcome = store
//!     .upload(Path::new("/tmp/report.pdf"), "report.pdf", "tenant-a", "application/pdf")
//!     .await?;
//! let downloaded = store.download(&outcome.final_path).await?;
//! # let _ = downloaded;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Storage worker │  ← C4: business logic only
//! ├─────────────────┤
//! │   BlobStore     │  ← storage primitives (S3-compatible)
//! └─────────────────┘
//! ```

mod config;
mod error;
mod s3_store;
pub mod store;
mod types;

pub use config::{BlobConfig, UploadRules};
pub use error::{BlobError, BlobResult};
pub use s3_store::{DownloadOutcome, S3CompatibleStore, S3Config, UploadOutcome};
pub use store::{BlobStore, GetResult, ObjectHead, PutResult, ResolvedRange, StoreCapabilities};
pub use types::{ByteRange, ByteStream};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{BlobConfig, BlobError, BlobResult, BlobStore, ByteRange, ByteStream};
}
