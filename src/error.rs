//! Error types and handling for the redaction pipeline
//!
//! Every stage returns a typed `Result`; the orchestrator is the only place that
//! decides whether an error aborts the request or degrades it.

use std::{io, result::Result as StdResult};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Custom result type for redaction operations
pub type Result<T> = StdResult<T, Error>;

/// Core error type for redaction operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Classifier unavailable: {0}")]
    ClassifierUnavailable(#[from] ClassifierError),

    #[error("Redaction write failure: {0}")]
    RedactionWriteFailure(String),

    #[error("Metadata write failure: {0}")]
    MetadataWriteFailure(String),

    #[error("Encryption failure: {0}")]
    EncryptionFailure(String),

    #[error("Decryption failure: {0}")]
    DecryptionFailure(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Resource scope error: {0}")]
    ResourceError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Serializable error classification reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedDocument,
    ClassifierUnavailable,
    RedactionWriteFailure,
    MetadataWriteFailure,
    EncryptionFailure,
    DecryptionFailure,
    InvalidRequest,
    Configuration,
    ResourceScope,
    Io,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedDocument(_) => ErrorKind::MalformedDocument,
            Error::ClassifierUnavailable(_) => ErrorKind::ClassifierUnavailable,
            Error::RedactionWriteFailure(_) => ErrorKind::RedactionWriteFailure,
            Error::MetadataWriteFailure(_) => ErrorKind::MetadataWriteFailure,
            Error::EncryptionFailure(_) => ErrorKind::EncryptionFailure,
            Error::DecryptionFailure(_) => ErrorKind::DecryptionFailure,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::ConfigError(_) => ErrorKind::Configuration,
            Error::ResourceError(_) => ErrorKind::ResourceScope,
            Error::IoError(_) => ErrorKind::Io,
            Error::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error must abort a pipeline run.
    ///
    /// Classifier unavailability is the single degradable condition; whether it
    /// actually degrades is decided by the configured failure policy.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::ClassifierUnavailable(_))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::InternalError(format!("blocking task failed: {}", err))
    }
}

// -------------------- Sub-Error Categories --------------------

/// Reasons the classifier adapter could not produce candidates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ClassifierError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("unparseable response: {0}")]
    Parse(String),
}
