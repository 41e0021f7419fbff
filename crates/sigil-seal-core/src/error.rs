//! Error types for challenge-response sealing

use std::fmt;

use thiserror::Error;

/// Result type alias for sealing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-checkable failure category
///
/// The engine's retry policy and the callers' UI decisions are driven by this
/// classification rather than by individual error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing inputs or invalid state shape; never retried
    Developer,
    /// The signing authority declined or its signature did not verify
    UserAuth,
    /// Communication failure or "try again later" from the hardware
    HardwareTransient,
    /// Sealing/unsealing failure or an unsafe hardware key
    HardwareFatal,
}

impl ErrorCategory {
    /// Whether the engine may retry an attempt failing with this category
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorCategory::HardwareTransient)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Developer => "developer",
            ErrorCategory::UserAuth => "user-auth",
            ErrorCategory::HardwareTransient => "hardware-transient",
            ErrorCategory::HardwareFatal => "hardware-fatal",
        };
        f.write_str(name)
    }
}

/// Failure classes reported by a sealing backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The hardware could not be reached
    Communication,
    /// The hardware is busy; the same request may succeed later
    TryLater,
    /// Sealing, unsealing, or signature check failed
    Crypto,
    /// Current platform state does not satisfy the sealing restrictions
    PlatformState,
    /// None of the requested algorithms is supported
    Unsupported,
    /// Anything else
    Internal,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendErrorKind::Communication => "communication failure",
            BackendErrorKind::TryLater => "try again later",
            BackendErrorKind::Crypto => "cryptographic failure",
            BackendErrorKind::PlatformState => "platform state mismatch",
            BackendErrorKind::Unsupported => "unsupported",
            BackendErrorKind::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// Error reported by a sealing backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Communication, message)
    }

    pub fn try_later(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::TryLater, message)
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Crypto, message)
    }

    /// Communication failures and "try again later" are transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            BackendErrorKind::Communication | BackendErrorKind::TryLater
        )
    }
}

/// Errors that can occur while sealing or unsealing a credential
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The public key info carries no signature algorithm
    #[error("No signature algorithms supplied")]
    NoAlgorithms,

    /// A required input is missing or malformed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Persisted salt does not carry the constant prefix or has no random part
    #[error("Malformed salt: {0}")]
    MalformedSalt(String),

    /// Persisted challenge info has no salt signature algorithm
    #[error("Salt signature algorithm missing from challenge info")]
    MissingSaltAlgorithm,

    /// Public key could not be parsed
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signing authority returned no signature
    #[error("Signature not obtained: {0}")]
    SignatureUnavailable(String),

    /// A returned signature did not verify
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// The challenge transport asked for the attempt to be retried
    #[error("Transient transport failure: {0}")]
    TransportTransient(String),

    /// Sealing backend error
    #[error("Sealing backend error: {0}")]
    Backend(#[from] BackendError),

    /// Readiness gate refused to operate
    #[error("Hardware not ready: {0}")]
    HardwareNotReady(String),

    /// Local cryptographic failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// A newer request aborted this one before it completed
    #[error("Operation superseded by a newer request")]
    Superseded,

    /// The engine shut down before the operation completed
    #[error("Engine stopped")]
    EngineStopped,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NoAlgorithms
            | Error::InvalidInput(_)
            | Error::MalformedSalt(_)
            | Error::MissingSaltAlgorithm
            | Error::InvalidPublicKey(_)
            | Error::EngineStopped => ErrorCategory::Developer,
            Error::SignatureUnavailable(_)
            | Error::SignatureVerificationFailed
            | Error::Superseded => ErrorCategory::UserAuth,
            Error::TransportTransient(_) => ErrorCategory::HardwareTransient,
            Error::Backend(e) if e.is_transient() => ErrorCategory::HardwareTransient,
            Error::Backend(_) | Error::HardwareNotReady(_) | Error::Crypto(_) => {
                ErrorCategory::HardwareFatal
            }
        }
    }

    /// Whether the engine may retry a Decrypt attempt that failed with this error
    pub fn is_transient(&self) -> bool {
        self.category().is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_classification() {
        assert!(BackendError::communication("link down").is_transient());
        assert!(BackendError::try_later("busy").is_transient());
        assert!(!BackendError::crypto("bad signature").is_transient());
        assert!(!BackendError::new(BackendErrorKind::PlatformState, "pcr").is_transient());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::NoAlgorithms.category(), ErrorCategory::Developer);
        assert_eq!(
            Error::MalformedSalt("empty".into()).category(),
            ErrorCategory::Developer
        );
        assert_eq!(
            Error::SignatureUnavailable("declined".into()).category(),
            ErrorCategory::UserAuth
        );
        assert_eq!(
            Error::Backend(BackendError::try_later("busy")).category(),
            ErrorCategory::HardwareTransient
        );
        assert_eq!(
            Error::Backend(BackendError::crypto("unseal")).category(),
            ErrorCategory::HardwareFatal
        );
        assert!(Error::TransportTransient("reset".into()).is_transient());
        assert!(!Error::Superseded.is_transient());
    }
}
