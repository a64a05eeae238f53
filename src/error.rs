//! Error types for the Dokimasia validation engine
//!
//! This module provides structured error handling using thiserror for
//! error definitions and anyhow for error propagation at the call sites.
//!
//! Per-record and per-task failures (an unresolved cohort, a missing task
//! definition) are not errors: they are carried inline in the output
//! structures so a single bad record can never abort a batch.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Cache store backend failure
    #[error("Cache store error: {0}")]
    Store(String),

    /// Task catalog failed load-time validation
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A spawned validation worker failed to join
    #[error("Worker task error: {0}")]
    WorkerJoin(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Convert anyhow::Error to EngineError
impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Catalog("duplicate task id: mot".to_string());
        assert_eq!(err.to_string(), "Catalog error: duplicate task id: mot");
    }

    #[test]
    fn test_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json");
        assert!(json_err.is_err());

        let engine_err: EngineError = json_err.unwrap_err().into();
        assert!(matches!(engine_err, EngineError::Serialization(_)));
    }
}
