//! # Error Handling Module
//!
//! ## Purpose
//! Centralized error handling for the statute retrieval engine, covering the
//! full taxonomy of ingestion, graph storage, vector index, and retrieval
//! failures.
//!
//! ## Input/Output Specification
//! - **Input**: Error conditions from all system components
//! - **Output**: Structured error types with context
//! - **Error Categories**: Ingestion, Graph, Index, Retrieval, Configuration
//!
//! ## Propagation Policy
//! - Extraction-time issues are local and recoverable: malformed statute or
//!   case blocks are skipped in lenient mode, ingestion continues.
//! - Dangling statute citations are not errors at all; they are counted in
//!   ingestion statistics and otherwise silently dropped.
//! - Index-time issues are fatal but self-healing: a corrupt snapshot
//!   triggers a rebuild from the graph store. Dimension mismatches abort
//!   index construction and are surfaced to the caller.
//! - Query-time issues either produce empty results (no matches) or are
//!   fatal transport errors (store unreachable), with no built-in retry.

use thiserror::Error;

/// Result type used throughout the application
pub type Result<T> = std::result::Result<T, KgError>;

/// Error types for the statute retrieval engine
#[derive(Debug, Error)]
pub enum KgError {
    /// A statute or case block failed its expected structural pattern
    #[error("Malformed {section} block: {details}")]
    MalformedInput { section: String, details: String },

    /// Embedding vectors of inconsistent length supplied to index build
    #[error("Dimension mismatch for '{fact_id}': expected {expected}, found {found}")]
    DimensionMismatch {
        fact_id: String,
        expected: usize,
        found: usize,
    },

    /// Structural inconsistency between the ANN structure and its side-table,
    /// or unreadable snapshot files
    #[error("Corrupt vector index: {details}")]
    CorruptIndex { details: String },

    /// The graph store cannot be opened or reached
    #[error("Graph store unavailable at '{path}': {reason}")]
    StoreUnavailable { path: String, reason: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailed { field: String, reason: String },

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KgError {
    /// Check if the error is recoverable by skipping or rebuilding
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            KgError::MalformedInput { .. } | KgError::CorruptIndex { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            KgError::MalformedInput { .. } => "ingestion",
            KgError::DimensionMismatch { .. } | KgError::CorruptIndex { .. } => "index",
            KgError::StoreUnavailable { .. } | KgError::Database(_) => "graph",
            KgError::Config { .. } | KgError::ValidationFailed { .. } | KgError::Toml(_) => {
                "configuration"
            }
            KgError::Io(_) | KgError::Serialization(_) | KgError::Json(_) => "storage",
            KgError::Internal { .. } => "generic",
        }
    }
}

/// Helper macro for internal errors
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::errors::KgError::Internal {
            message: $msg.to_string(),
        }
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::errors::KgError::Internal {
            message: format!($fmt, $($arg)*),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_is_recoverable() {
        let err = KgError::MalformedInput {
            section: "case".to_string(),
            details: "missing 一、 marker".to_string(),
        };
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "ingestion");
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let err = KgError::DimensionMismatch {
            fact_id: "Fact3".to_string(),
            expected: 768,
            found: 384,
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.category(), "index");
    }

    #[test]
    fn corrupt_index_recovers_by_rebuild() {
        let err = KgError::CorruptIndex {
            details: "side-table length 3 != index length 5".to_string(),
        };
        assert!(err.is_recoverable());
    }
}
