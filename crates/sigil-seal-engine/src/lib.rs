//! Sigil Seal Engine - Challenge-response credential sealing
//!
//! This crate provides:
//! - The sealing backend and challenge transport contracts
//! - GenerateNew, Decrypt and VerifyKey operations
//! - The single-flight engine with readiness gate and Decrypt retry
//! - A software sealing backend and a local-key transport for development
//!
//! # Protocol
//!
//! A passkey is `secret || SHA-256(salt_signature)`. The secret is sealed by
//! the backend to the signing authority's public key and can only be unsealed
//! with a signature over a backend-chosen challenge. The salt signature is a
//! signature over a random, tag-prefixed salt chosen at generation time. Both
//! signatures must be obtained from the signing authority to recover the
//! passkey.

pub mod backend;
pub mod config;
pub mod engine;
pub mod local_signer;
mod operation;
pub mod readiness;
pub mod software;
pub mod transport;

pub use backend::{SealedSecret, SealingBackend, UnsealingSession};
pub use config::EngineConfig;
pub use engine::{
    ChallengeCredentialsEngine, DecryptRequest, EngineHandle, GenerateNewRequest, PendingResult,
    VerifyKeyRequest,
};
pub use local_signer::LocalKeyTransport;
pub use readiness::{Capabilities, ReadinessGate};
pub use software::SoftwareSealingBackend;
pub use transport::{
    ChallengeKind, ChallengeTransport, SignatureReply, SignatureRequest, SignatureResponder,
    TransportError,
};

pub use sigil_seal_core::{Error, ErrorCategory, Result};
