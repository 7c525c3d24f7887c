use p8fs_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("malformed storage event: {0}")]
    MalformedEvent(String),

    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error(transparent)]
    Blob(#[from] p8fs_blob::BlobError),

    #[error(transparent)]
    Broker(#[from] p8fs_broker::BrokerError),

    #[error(transparent)]
    Repo(#[from] p8fs_repo::RepoError),

    #[error("no content processor registered for content_type={content_type} path={path}")]
    NoProcessor { content_type: String, path: String },

    #[error("processing failed: {0}")]
    Processing(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Classify for WorkerError {
    fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::MalformedEvent(_) => ErrorKind::Parse,
            WorkerError::BlobNotFound(_) => ErrorKind::NotFound,
            WorkerError::Blob(e) => e.kind(),
            WorkerError::Broker(e) => e.kind(),
            WorkerError::Repo(e) => e.kind(),
            WorkerError::NoProcessor { .. } => ErrorKind::Validation,
            WorkerError::Processing(_) => ErrorKind::Validation,
            WorkerError::Internal(_) => ErrorKind::Fatal,
        }
    }
}

pub type WorkerResult<T> = Result<T, WorkerError>;
