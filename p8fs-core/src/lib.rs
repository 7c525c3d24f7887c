//! p8fs-core: shared tenant context, error taxonomy, configuration,
//! data model and observability events for the P8FS storage pipeline.

pub mod config;
pub mod errors;
pub mod events;
pub mod ids;
pub mod model;
pub mod tenant;

pub use config::EnvConfig;
pub use errors::{Classify, ErrorKind, PipelineError};
pub use events::{EventBus, PipelineEvent};
pub use model::{
    Chunk, ChunkCategory, EmbeddingRecord, File, InlineEdge, KeyValueMapping, Moment,
    SimilarityMetric, StorageEvent, StorageEventType, TenantId,
};
pub use tenant::TenantContext;
