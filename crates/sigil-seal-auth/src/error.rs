//! Error types for the auth block

use thiserror::Error;

use sigil_seal_core::{Error as SealError, ErrorCategory};

/// Result type for auth block operations
pub type Result<T> = std::result::Result<T, AuthBlockError>;

/// Errors surfaced by the challenge-credential auth block
#[derive(Debug, Error)]
pub enum AuthBlockError {
    /// Engine failure, passed through unchanged
    #[error(transparent)]
    Engine(#[from] SealError),

    /// Persisted state is structurally invalid for this auth block
    #[error("Invalid auth block state: {0}")]
    InvalidState(String),

    /// Key derivation failed
    #[error("Key derivation failed: {0}")]
    Kdf(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthBlockError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthBlockError::Engine(e) => e.category(),
            AuthBlockError::InvalidState(_) | AuthBlockError::Serialization(_) => {
                ErrorCategory::Developer
            }
            AuthBlockError::Kdf(_) | AuthBlockError::Io(_) => ErrorCategory::HardwareFatal,
        }
    }
}
