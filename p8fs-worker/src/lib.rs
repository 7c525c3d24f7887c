//! Per-tier storage worker: downloads the blob referenced by a storage
//! event, extracts and chunks its content, and writes File/Chunk rows
//! through the dual-indexing repository.

pub mod config;
pub mod error;
pub mod path;
pub mod processor;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use path::normalize_blob_path;
pub use processor::{ContentProcessor, FileMetadata, PlainTextProcessor, ProcessedChunk, ProcessedDocument, ProcessorOptions, ProcessorRegistry};
pub use worker::{run, WorkerDeps};
