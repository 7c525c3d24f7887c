//! Dual-indexing repository layer: every `upsert` writes the primary
//! SQL row, then best-effort generates embeddings and maintains the
//! entity-key KV index, mirroring the source's `BaseRepository`.

pub mod config;
pub mod dialect;
pub mod embeddings;
pub mod error;
pub mod filter;
pub mod kv;
pub mod models;
pub mod provider;
pub mod repository;
pub mod schema;

pub use config::RepoConfig;
pub use dialect::Dialect;
pub use embeddings::{EmbeddingProvider, LocalHashEmbeddingProvider, OpenAiEmbeddingProvider};
pub use error::{RepoError, RepoResult};
pub use filter::{Filter, OrderBy, SelectParams};
pub use kv::{KvStore, MemoryKvStore};
pub use models::{ChunkSchema, FileSchema, MomentSchema};
pub use provider::{MemoryProvider, SqlProvider, SqlxProvider};
pub use repository::{QueryHint, Repository, SystemRepository, TenantRepository};
pub use schema::{EmbeddingField, Row, Schema};
