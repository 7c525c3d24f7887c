use p8fs_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("sql error: {0}")]
    Sql(String),

    #[error("entity not found for key {0}")]
    NotFound(String),

    #[error("unique constraint violated on {table} ({fields:?})")]
    Conflict { table: String, fields: Vec<String> },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("embedding provider {provider} failed: {reason}")]
    Embedding { provider: String, reason: String },

    #[error("kv store error: {0}")]
    Kv(String),

    #[error("query hint {0:?} is not implemented")]
    NotImplemented(String),

    #[error("repository misconfigured: {0}")]
    Config(String),
}

impl Classify for RepoError {
    fn kind(&self) -> ErrorKind {
        match self {
            RepoError::Sql(_) => ErrorKind::Transient,
            RepoError::NotFound(_) => ErrorKind::NotFound,
            RepoError::Conflict { .. } => ErrorKind::Conflict,
            RepoError::Validation(_) => ErrorKind::Validation,
            RepoError::Embedding { .. } => ErrorKind::Indexing,
            RepoError::Kv(_) => ErrorKind::Indexing,
            RepoError::NotImplemented(_) => ErrorKind::Validation,
            RepoError::Config(_) => ErrorKind::Fatal,
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
