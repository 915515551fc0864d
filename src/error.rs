use http::StatusCode;
use thiserror::Error;

use crate::types::{OperationKind, RecordId};

#[derive(Error, Debug, Clone)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid update fields for {model}: {fields:?} cannot be serialized automatically")]
    InvalidUpdateFields { model: String, fields: Vec<String> },

    #[error("Index operation '{kind}' failed for record {record_id} in index '{index}': {message}")]
    IndexOperation {
        kind: OperationKind,
        record_id: RecordId,
        index: String,
        message: String,
    },

    #[error("Search execution failed: {0}")]
    SearchExecution(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Index not configured: {0}")]
    IndexNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Json(e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::Storage(e.to_string())
    }
}

impl SyncError {
    /// Build an [`SyncError::IndexOperation`] from a transport failure.
    pub fn index_operation(
        kind: OperationKind,
        record_id: &RecordId,
        index: &str,
        err: impl std::fmt::Display,
    ) -> Self {
        SyncError::IndexOperation {
            kind,
            record_id: record_id.clone(),
            index: index.to_string(),
            message: err.to_string(),
        }
    }

    /// Errors that must stop the process from serving search traffic.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }
}

/// Failure talking to the search engine.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("engine returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("could not decode engine response: {0}")]
    Decode(String),

    #[error("no transport for connection '{0}'")]
    UnknownConnection(String),
}

impl TransportError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}
