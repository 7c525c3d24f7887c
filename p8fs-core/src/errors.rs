//! Structured error taxonomy shared across the pipeline.
//!
//! Every crate defines its own `thiserror` leaf enum for the errors it can
//! actually produce, then classifies each variant into one of the
//! [`ErrorKind`] buckets below. The bucket, not the leaf type, is what
//! callers (router, worker) use to decide whether to ack, nak, or retry a
//! message.

use std::fmt;

/// Pipeline-wide error classification. Each kind carries a fixed
/// ack/nak/retry policy, documented on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed message body or unparsable event. Ack, do not retry.
    Parse,
    /// Referenced resource (blob, row) does not exist. Ack, do not retry.
    NotFound,
    /// Transient infrastructure failure (network, timeout, 5xx). Nak, retry.
    Transient,
    /// Concurrent write lost a race (e.g. unique constraint). Nak, retry.
    Conflict,
    /// Input failed a validation rule. Ack, do not retry.
    Validation,
    /// The embedding/KV side of a dual-index write failed. Logged, never
    /// fails the overall operation (best-effort).
    Indexing,
    /// Unrecoverable programmer/config error. Nak, let max-deliver exhaust.
    Fatal,
}

impl ErrorKind {
    /// Whether a message carrying this error should be redelivered.
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Conflict | ErrorKind::Fatal)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "parse",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transient => "transient",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Indexing => "indexing",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A classified pipeline error, carryable through `anyhow::Error` at
/// process boundaries (binaries, worker loops).
#[derive(Debug)]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub message: String,
    pub source: Option<anyhow::Error>,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, msg)
    }
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, msg)
    }
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, msg)
    }
    pub fn indexing(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Indexing, msg)
    }
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, msg)
    }

    pub fn should_retry(&self) -> bool {
        self.kind.should_retry()
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.message)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Anything that knows which ack/nak bucket it belongs to. Leaf error
/// enums in `p8fs-blob`, `p8fs-broker`, `p8fs-repo` implement this so the
/// router/worker loops can dispatch on `.kind()` without matching every
/// concrete variant.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for PipelineError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[macro_export]
macro_rules! bail_pipeline {
    ($ctor:ident, $msg:expr) => {
        return Err($crate::errors::PipelineError::$ctor($msg).into());
    };
    ($ctor:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::errors::PipelineError::$ctor(format!($fmt, $($arg)*)).into());
    };
}
