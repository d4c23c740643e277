//! Error types for the Biocaching SDK

use thiserror::Error;

/// Errors raised while turning a raw server record into a canonical observation
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid {axis} coordinate: {value:?}")]
    InvalidCoordinate { axis: &'static str, value: String },

    #[error("Invalid observation timestamp: {0:?}")]
    InvalidTimestamp(String),

    #[error("Observation at index {index} (id {id}) is malformed: {source}")]
    BatchElement {
        index: usize,
        id: u64,
        #[source]
        source: Box<NormalizationError>,
    },
}

/// Errors raised by a key-value persistence backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while committing session state
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Login response is missing {0}")]
    IncompleteLogin(&'static str),
}

/// Errors raised by the transport collaborator
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Response body is not valid JSON: {0}")]
    Decode(String),

    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

/// Errors returned by the SDK client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Unexpected response shape: {0}")]
    Response(#[from] serde_json::Error),

    #[error("Not logged in")]
    NotAuthorized,

    #[error("Login rejected by server: {0}")]
    LoginRejected(serde_json::Value),

    #[error("Observation edit contains no fields")]
    EmptyEdit,
}
