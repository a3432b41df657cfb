//! Error types for the evofield workspace
//!
//! Provides a unified error type and domain-specific error variants

use thiserror::Error;

/// Result type alias using EvofieldError
pub type Result<T> = std::result::Result<T, EvofieldError>;

/// Unified error type for evofield operations
#[derive(Debug, Error)]
pub enum EvofieldError {
    // Physical invariant errors
    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    // Checkpoint errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Physical invariant violations reported by the admission gate
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("Energy {energy} is negative")]
    NegativeEnergy { energy: f64 },

    #[error("Energy {energy} reached upper bound {upper_bound}")]
    EnergyCeiling { energy: f64, upper_bound: f64 },

    #[error("Energy is not a finite number")]
    NonFiniteEnergy,
}

// Implement From for common external error types
impl From<serde_json::Error> for EvofieldError {
    fn from(err: serde_json::Error) -> Self {
        EvofieldError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EvofieldError {
    fn from(err: std::io::Error) -> Self {
        EvofieldError::Storage(err.to_string())
    }
}

impl From<anyhow::Error> for EvofieldError {
    fn from(err: anyhow::Error) -> Self {
        EvofieldError::Internal(err.to_string())
    }
}
