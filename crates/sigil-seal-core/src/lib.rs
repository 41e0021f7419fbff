//! Sigil Seal Core - Shared types, salt handling, and cryptographic primitives
//!
//! This crate provides the data model for challenge-response credential
//! sealing: a secret sealed by a hardware security module to the public key of
//! an external signing authority, recoverable only by obtaining signatures
//! from that authority.

pub mod algorithm;
pub mod challenge;
pub mod crypto;
pub mod error;
pub mod platform;
pub mod salt;
pub mod secret;

pub use algorithm::{choose_challenge_algorithm, PublicKeyInfo, SignatureAlgorithm};
pub use challenge::{ChallengeInfo, GenerateOrDecryptResult};
pub use crypto::{combine_passkey, verify_signature};
pub use error::{BackendError, BackendErrorKind, Error, ErrorCategory, Result};
pub use platform::{PcrRestriction, PlatformRestrictions, USER_PCR_INDEX};
pub use salt::{generate_salt, validate_salt, SALT_CONSTANT, SALT_RANDOM_BYTES};
pub use secret::{Passkey, SecretValue};

/// Number of random bytes in a key verification challenge
pub const VERIFY_CHALLENGE_BYTES: usize = 20;

/// Maximum number of Decrypt attempts (first attempt included) when the
/// failure is classified as transient
pub const MAX_DECRYPT_ATTEMPTS: u32 = 3;

/// Serde helper for variable-length byte strings as hex
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
