//! Router-local error type, classified into the pipeline-wide taxonomy so
//! the pull loop can decide ack vs. nak without matching every variant.

use p8fs_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("malformed storage event: {0}")]
    MalformedEvent(String),

    #[error("broker error: {0}")]
    Broker(#[from] p8fs_broker::BrokerError),

    #[error("{0}")]
    Internal(String),
}

impl Classify for RouterError {
    fn kind(&self) -> ErrorKind {
        match self {
            RouterError::MalformedEvent(_) => ErrorKind::Parse,
            RouterError::Broker(e) => e.kind(),
            RouterError::Internal(_) => ErrorKind::Fatal,
        }
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
