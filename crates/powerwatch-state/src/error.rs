//! Error types for the shared state store.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("invalid {method} request for {path:?}: {reason}")]
    Request {
        method: &'static str,
        path: String,
        reason: String,
    },

    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("{method} {path} returned HTTP {status}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },
}
