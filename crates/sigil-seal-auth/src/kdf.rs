//! Key derivation from the passkey
//!
//! The passkey is never used as a key directly. A key derivation block turns
//! it into the key material the credential system consumes and records what
//! it needs to repeat the derivation.

use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AuthBlockError, Result};

/// Size of each derived key in bytes
pub const DERIVED_KEY_SIZE: usize = 32;

/// Size of each derivation salt in bytes
pub const KDF_SALT_SIZE: usize = 16;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024, // 64 MB
            iterations: 3,
            parallelism: 1,
        }
    }
}

/// Key material derived from a passkey
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyBlobs {
    /// Vault keyset key
    pub vkk_key: [u8; DERIVED_KEY_SIZE],
    /// PKCS#11 token authorization key
    pub chaps_key: [u8; DERIVED_KEY_SIZE],
    /// Key wrapping the credential reset seed
    pub reset_seed_key: [u8; DERIVED_KEY_SIZE],
}

impl std::fmt::Debug for KeyBlobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyBlobs([REDACTED])")
    }
}

/// Persisted state of a key derivation block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfState {
    #[serde(with = "sigil_seal_core::hex_bytes")]
    pub vkk_salt: Vec<u8>,
    #[serde(with = "sigil_seal_core::hex_bytes")]
    pub chaps_salt: Vec<u8>,
    #[serde(with = "sigil_seal_core::hex_bytes")]
    pub reset_seed_salt: Vec<u8>,
    /// Parameters the keys were derived with
    pub params: KdfParams,
}

/// Turns a passkey into key material
pub trait KeyDerivationBlock: Send + Sync {
    /// Derive fresh key material, returning the state needed to repeat it
    fn create(&self, passkey: &[u8]) -> Result<(KeyBlobs, KdfState)>;

    /// Repeat a derivation recorded in `state`
    fn derive(&self, passkey: &[u8], state: &KdfState) -> Result<KeyBlobs>;
}

/// Argon2id with three independent salts
#[derive(Debug, Clone, Default)]
pub struct Argon2KeyDerivation {
    params: KdfParams,
}

impl Argon2KeyDerivation {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }
}

impl KeyDerivationBlock for Argon2KeyDerivation {
    fn create(&self, passkey: &[u8]) -> Result<(KeyBlobs, KdfState)> {
        let state = KdfState {
            vkk_salt: random_salt(),
            chaps_salt: random_salt(),
            reset_seed_salt: random_salt(),
            params: self.params,
        };
        let blobs = self.derive(passkey, &state)?;
        Ok((blobs, state))
    }

    fn derive(&self, passkey: &[u8], state: &KdfState) -> Result<KeyBlobs> {
        if passkey.is_empty() {
            return Err(AuthBlockError::Kdf("Empty passkey".to_string()));
        }
        Ok(KeyBlobs {
            vkk_key: derive_key(passkey, &state.vkk_salt, &state.params)?,
            chaps_key: derive_key(passkey, &state.chaps_salt, &state.params)?,
            reset_seed_key: derive_key(passkey, &state.reset_seed_salt, &state.params)?,
        })
    }
}

fn random_salt() -> Vec<u8> {
    let mut salt = vec![0u8; KDF_SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive one key using Argon2id
fn derive_key(passkey: &[u8], salt: &[u8], params: &KdfParams) -> Result<[u8; DERIVED_KEY_SIZE]> {
    let argon_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(DERIVED_KEY_SIZE),
    )
    .map_err(|e| AuthBlockError::Kdf(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, argon_params);

    let mut key = [0u8; DERIVED_KEY_SIZE];
    argon2
        .hash_password_into(passkey, salt, &mut key)
        .map_err(|e| AuthBlockError::Kdf(format!("Argon2 failed: {}", e)))?;
    Ok(key)
}
