//! The single error type returned by every fallible operation in this crate.
//!
//! Mirrors the pattern used throughout the LSH/vector-store corpus this crate
//! draws on: one `thiserror`-derived enum per library, `#[from]` conversions
//! for the handful of external error sources we actually touch (`io`,
//! `bincode`), and everything else expressed as a named, documented variant
//! rather than a free-form string.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, VdbError>;

#[derive(Debug, Error)]
pub enum VdbError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} id already in use: {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector has zero L2 norm and cannot be normalized")]
    DegenerateVector,

    #[error("library '{library_id}' has no active index")]
    NotIndexed { library_id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("internal invariant violation: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),
}

impl VdbError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        VdbError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn duplicate(kind: &'static str, id: impl Into<String>) -> Self {
        VdbError::DuplicateId {
            kind,
            id: id.into(),
        }
    }

    pub fn not_indexed(library_id: impl Into<String>) -> Self {
        VdbError::NotIndexed {
            library_id: library_id.into(),
        }
    }
}
