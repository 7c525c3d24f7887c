use p8fs_core::{Classify, ErrorKind};
use thiserror::Error;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors that can occur against the message broker layer.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Failed to connect to broker: {reason}")]
    Connection { reason: String },

    #[error("Stream not found: {0}")]
    StreamNotFound(String),

    #[error("Consumer not found: {consumer} on stream {stream}")]
    ConsumerNotFound { stream: String, consumer: String },

    #[error("Publish failed: {reason}")]
    PublishFailed { reason: String },

    #[error("Pull failed: {reason}")]
    PullFailed { reason: String },

    #[error("Ack failed for {ack_token}: {reason}")]
    AckFailed { ack_token: String, reason: String },

    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Backend does not support feature: {0}")]
    Unsupported(String),

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    pub fn connection<S: Into<String>>(reason: S) -> Self {
        Self::Connection { reason: reason.into() }
    }

    pub fn stream_not_found<S: Into<String>>(stream: S) -> Self {
        Self::StreamNotFound(stream.into())
    }

    pub fn consumer_not_found<S: Into<String>>(stream: S, consumer: S) -> Self {
        Self::ConsumerNotFound {
            stream: stream.into(),
            consumer: consumer.into(),
        }
    }

    pub fn publish_failed<S: Into<String>>(reason: S) -> Self {
        Self::PublishFailed { reason: reason.into() }
    }

    pub fn pull_failed<S: Into<String>>(reason: S) -> Self {
        Self::PullFailed { reason: reason.into() }
    }

    pub fn ack_failed<S: Into<String>>(ack_token: S, reason: S) -> Self {
        Self::AckFailed {
            ack_token: ack_token.into(),
            reason: reason.into(),
        }
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

impl Classify for BrokerError {
    fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::StreamNotFound(_) | BrokerError::ConsumerNotFound { .. } => {
                ErrorKind::NotFound
            }
            BrokerError::PayloadTooLarge { .. } => ErrorKind::Validation,
            BrokerError::Unsupported(_) => ErrorKind::Fatal,
            BrokerError::Connection { .. }
            | BrokerError::PublishFailed { .. }
            | BrokerError::PullFailed { .. }
            | BrokerError::AckFailed { .. }
            | BrokerError::Timeout(_) => ErrorKind::Transient,
            BrokerError::Serialization { .. } => ErrorKind::Parse,
            BrokerError::Internal(_) => ErrorKind::Fatal,
        }
    }
}
