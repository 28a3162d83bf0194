//! Typed error enum for the service layer.
//!
//! Unifies storage and model failures into a single error type, enabling
//! callers to match on specific failure modes instead of downcasting opaque
//! `anyhow::Error` boxes.

use thiserror::Error;
use threadline_llm::LlmError;
use threadline_storage::StorageError;

/// Service-layer error unifying storage and model failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage operation failed.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Model API call failed.
    #[error("llm: {0}")]
    Llm(#[from] LlmError),

    /// Caller provided invalid input (missing user id, malformed data).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization failed in the service layer.
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    /// Whether this error is likely transient (worth retrying).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Llm(e) => e.is_transient(),
            _ => false,
        }
    }
}
