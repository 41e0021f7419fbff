//! Sigil Seal Auth - Challenge-credential auth block
//!
//! Binds the challenge credentials engine to key derivation:
//! - Create: seal a new secret, derive key material, persist the state
//! - Derive: recover the passkey from persisted state, derive key material
//!
//! Engine errors are passed through unchanged so their category survives.

pub mod auth_block;
pub mod config;
pub mod error;
pub mod kdf;
pub mod state;

pub use auth_block::{AuthInput, ChallengeCredentialAuthBlock, ChallengeCredentialInput};
pub use config::{SealConfig, CONFIG_ENV_VAR};
pub use error::{AuthBlockError, Result};
pub use kdf::{Argon2KeyDerivation, KdfParams, KdfState, KeyBlobs, KeyDerivationBlock};
pub use state::{AuthBlockState, ChallengeCredentialState};
