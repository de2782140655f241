//! Error types for the memory engine.
//!
//! Backend failures on the read path are recoverable: the orchestrator
//! turns them into degradation flags instead of surfacing them to the
//! caller. Only malformed input and durable-write failures cross the
//! facade boundary as errors.

use std::time::Duration;

use crate::models::Backend;

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Caller input rejected before any backend was contacted.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A backend call failed or the backend was unreachable.
    #[error("{backend} unavailable: {message}")]
    Backend { backend: Backend, message: String },

    /// A backend call exceeded its time budget.
    #[error("{backend} timed out after {elapsed_ms}ms")]
    Timeout { backend: Backend, elapsed_ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn backend(backend: Backend, error: impl std::fmt::Display) -> Self {
        Self::Backend {
            backend,
            message: error.to_string(),
        }
    }

    pub fn timeout(backend: Backend, elapsed: Duration) -> Self {
        Self::Timeout {
            backend,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Whether this error should become a degradation flag on the read
    /// path rather than propagate.
    pub fn is_degradation(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Timeout { .. })
    }

    /// The backend a degradation-class error names, if any.
    pub fn degraded_backend(&self) -> Option<Backend> {
        match self {
            Self::Backend { backend, .. } | Self::Timeout { backend, .. } => Some(*backend),
            _ => None,
        }
    }
}
