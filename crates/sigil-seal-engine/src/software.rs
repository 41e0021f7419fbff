//! Software sealing backend
//!
//! Stands in for the hardware security module in development and tests. A
//! sealed blob is `nonce || ChaCha20-Poly1305(storage_key, payload)` where the
//! payload carries the secret together with everything it is bound to. The
//! storage key never leaves the backend, so blobs are only unsealable by the
//! backend instance (or a clone of its key) that created them.
//!
//! Platform state is simulated with an in-memory PCR bank.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use sigil_seal_core::platform::{extend_pcr, PCR_DIGEST_SIZE};
use sigil_seal_core::{
    verify_signature, BackendError, BackendErrorKind, PlatformRestrictions, SecretValue,
    SignatureAlgorithm, USER_PCR_INDEX,
};

use crate::backend::{SealedSecret, SealingBackend, UnsealingSession};

/// Size of the storage key in bytes
pub const STORAGE_KEY_SIZE: usize = 32;

/// Size of the ChaCha20-Poly1305 nonce in bytes
const NONCE_SIZE: usize = 12;

/// Size of generated secrets in bytes
pub const SECRET_SIZE: usize = 32;

/// Size of unsealing challenges in bytes
const UNSEAL_CHALLENGE_SIZE: usize = 32;

/// Encrypted content of a sealed blob
#[derive(Serialize, Deserialize)]
struct SealedPayload {
    secret: Vec<u8>,
    public_key_der: Vec<u8>,
    algorithms: Vec<SignatureAlgorithm>,
    restrictions: PlatformRestrictions,
    bound_user: String,
}

impl Drop for SealedPayload {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Sealing backend backed by a software storage key
pub struct SoftwareSealingBackend {
    storage_key: Zeroizing<[u8; STORAGE_KEY_SIZE]>,
    pcrs: Mutex<BTreeMap<u32, Vec<u8>>>,
    roca_vulnerable: bool,
}

impl SoftwareSealingBackend {
    /// Create a backend with a fresh random storage key
    pub fn new() -> Self {
        let mut key = [0u8; STORAGE_KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        let backend = Self::with_storage_key(key);
        key.zeroize();
        backend
    }

    /// Create a backend with a fixed storage key
    pub fn with_storage_key(storage_key: [u8; STORAGE_KEY_SIZE]) -> Self {
        let mut pcrs = BTreeMap::new();
        pcrs.insert(USER_PCR_INDEX, vec![0u8; PCR_DIGEST_SIZE]);
        Self {
            storage_key: Zeroizing::new(storage_key),
            pcrs: Mutex::new(pcrs),
            roca_vulnerable: false,
        }
    }

    /// Report the storage root key as ROCA-vulnerable
    pub fn with_roca_vulnerable(mut self, vulnerable: bool) -> Self {
        self.roca_vulnerable = vulnerable;
        self
    }

    /// Extend a simulated PCR with a measurement
    pub fn extend_pcr(&self, index: u32, data: &[u8]) -> Result<(), BackendError> {
        let mut pcrs = self.lock_pcrs()?;
        let current = pcrs
            .get(&index)
            .cloned()
            .unwrap_or_else(|| vec![0u8; PCR_DIGEST_SIZE]);
        pcrs.insert(index, extend_pcr(&current, data));
        debug!("Extended PCR {}", index);
        Ok(())
    }

    /// Current value of a simulated PCR
    pub fn pcr_value(&self, index: u32) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.lock_pcrs()?.get(&index).cloned())
    }

    fn lock_pcrs(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<u32, Vec<u8>>>, BackendError> {
        self.pcrs
            .lock()
            .map_err(|_| BackendError::new(BackendErrorKind::Internal, "PCR bank lock poisoned"))
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, BackendError> {
        ChaCha20Poly1305::new_from_slice(self.storage_key.as_ref())
            .map_err(|e| BackendError::crypto(format!("Invalid storage key: {}", e)))
    }

    fn seal_payload(&self, payload: &SealedPayload) -> Result<Vec<u8>, BackendError> {
        let plaintext = Zeroizing::new(bincode::serialize(payload).map_err(|e| {
            BackendError::new(
                BackendErrorKind::Internal,
                format!("Serialization failed: {}", e),
            )
        })?);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|e| BackendError::crypto(format!("Sealing failed: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn open_payload(&self, blob: &[u8]) -> Result<SealedPayload, BackendError> {
        if blob.len() < NONCE_SIZE {
            return Err(BackendError::crypto("Sealed blob too short"));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = Zeroizing::new(
            self.cipher()?
                .decrypt(nonce, ciphertext)
                .map_err(|_| BackendError::crypto("Sealed blob authentication failed"))?,
        );
        bincode::deserialize(&plaintext)
            .map_err(|e| BackendError::crypto(format!("Sealed blob malformed: {}", e)))
    }
}

impl Default for SoftwareSealingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SealingBackend for SoftwareSealingBackend {
    fn create_sealed_secret(
        &self,
        public_key_der: &[u8],
        algorithms: &[SignatureAlgorithm],
        restrictions: &PlatformRestrictions,
        bound_user: &str,
    ) -> Result<SealedSecret, BackendError> {
        if algorithms.is_empty() {
            return Err(BackendError::new(
                BackendErrorKind::Unsupported,
                "No signature algorithms to seal against",
            ));
        }

        let mut secret = vec![0u8; SECRET_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut secret);

        let payload = SealedPayload {
            secret: secret.clone(),
            public_key_der: public_key_der.to_vec(),
            algorithms: algorithms.to_vec(),
            restrictions: restrictions.clone(),
            bound_user: bound_user.to_string(),
        };
        let sealed_blob = self.seal_payload(&payload)?;

        info!(
            "Sealed {}-byte secret under {} restriction set(s)",
            SECRET_SIZE,
            restrictions.0.len()
        );
        Ok(SealedSecret {
            secret: SecretValue::new(secret),
            sealed_blob,
        })
    }

    fn create_unsealing_session(
        &self,
        sealed_blob: &[u8],
        public_key_der: &[u8],
        algorithms: &[SignatureAlgorithm],
        locked_to_single_user: bool,
    ) -> Result<Box<dyn UnsealingSession>, BackendError> {
        let payload = self.open_payload(sealed_blob)?;

        if payload.public_key_der != public_key_der {
            return Err(BackendError::crypto(
                "Sealed secret is bound to a different public key",
            ));
        }

        let algorithm = algorithms
            .iter()
            .copied()
            .find(|algorithm| payload.algorithms.contains(algorithm))
            .ok_or_else(|| {
                BackendError::new(
                    BackendErrorKind::Unsupported,
                    "None of the requested algorithms was allowed at sealing time",
                )
            })?;

        if let Some(restriction) = payload.restrictions.select(locked_to_single_user) {
            let pcrs = self.lock_pcrs()?;
            if !restriction.is_satisfied_by(&pcrs) {
                return Err(BackendError::new(
                    BackendErrorKind::PlatformState,
                    "Platform state does not satisfy the sealing policy",
                ));
            }
        }

        let mut challenge = vec![0u8; UNSEAL_CHALLENGE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut challenge);
        debug!(
            "Unsealing session for {} opened with {}",
            payload.bound_user, algorithm
        );

        Ok(Box::new(SoftwareUnsealingSession {
            secret: SecretValue::new(payload.secret.clone()),
            public_key_der: payload.public_key_der.clone(),
            challenge,
            algorithm,
        }))
    }

    fn is_srk_roca_vulnerable(&self) -> Result<bool, BackendError> {
        Ok(self.roca_vulnerable)
    }

    fn backend_type(&self) -> &'static str {
        "software"
    }
}

struct SoftwareUnsealingSession {
    secret: SecretValue,
    public_key_der: Vec<u8>,
    challenge: Vec<u8>,
    algorithm: SignatureAlgorithm,
}

impl UnsealingSession for SoftwareUnsealingSession {
    fn challenge_value(&self) -> &[u8] {
        &self.challenge
    }

    fn challenge_algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    fn unseal(self: Box<Self>, signature: &[u8]) -> Result<SecretValue, BackendError> {
        verify_signature(&self.public_key_der, self.algorithm, &self.challenge, signature)
            .map_err(|e| BackendError::crypto(format!("Challenge signature rejected: {}", e)))?;
        Ok(self.secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;
    use sigil_seal_core::crypto::{encode_public_key, sign};

    fn key() -> (SigningKey, Vec<u8>) {
        let key = SigningKey::random(&mut rand::rngs::OsRng);
        let der = encode_public_key(key.verifying_key()).unwrap();
        (key, der)
    }

    const ALGS: &[SignatureAlgorithm] = &[SignatureAlgorithm::EcdsaSha256];

    #[test]
    fn test_seal_unseal() {
        let backend = SoftwareSealingBackend::new();
        let (key, der) = key();
        let sealed = backend
            .create_sealed_secret(&der, ALGS, &PlatformRestrictions::default(), "user")
            .unwrap();
        assert_eq!(sealed.secret.len(), SECRET_SIZE);

        let session = backend
            .create_unsealing_session(&sealed.sealed_blob, &der, ALGS, false)
            .unwrap();
        let signature = sign(&key, session.challenge_algorithm(), session.challenge_value()).unwrap();
        let secret = session.unseal(&signature).unwrap();
        assert_eq!(secret.as_bytes(), sealed.secret.as_bytes());
    }

    #[test]
    fn test_unseal_with_wrong_signature() {
        let backend = SoftwareSealingBackend::new();
        let (_, der) = key();
        let (other, _) = key();
        let sealed = backend
            .create_sealed_secret(&der, ALGS, &PlatformRestrictions::default(), "user")
            .unwrap();

        let session = backend
            .create_unsealing_session(&sealed.sealed_blob, &der, ALGS, false)
            .unwrap();
        let signature =
            sign(&other, session.challenge_algorithm(), session.challenge_value()).unwrap();
        let err = session.unseal(&signature).unwrap_err();
        assert_eq!(err.kind, BackendErrorKind::Crypto);
    }

    #[test]
    fn test_blob_bound_to_storage_key() {
        let (_, der) = key();
        let sealed = SoftwareSealingBackend::new()
            .create_sealed_secret(&der, ALGS, &PlatformRestrictions::default(), "user")
            .unwrap();

        let err = SoftwareSealingBackend::new()
            .create_unsealing_session(&sealed.sealed_blob, &der, ALGS, false)
            .err()
            .unwrap();
        assert_eq!(err.kind, BackendErrorKind::Crypto);
    }

    #[test]
    fn test_session_uses_current_algorithm_list() {
        let backend = SoftwareSealingBackend::new();
        let (_, der) = key();
        let sealed = backend
            .create_sealed_secret(
                &der,
                &[SignatureAlgorithm::EcdsaSha1, SignatureAlgorithm::EcdsaSha384],
                &PlatformRestrictions::default(),
                "user",
            )
            .unwrap();

        let session = backend
            .create_unsealing_session(
                &sealed.sealed_blob,
                &der,
                &[SignatureAlgorithm::EcdsaSha384, SignatureAlgorithm::EcdsaSha1],
                false,
            )
            .unwrap();
        assert_eq!(session.challenge_algorithm(), SignatureAlgorithm::EcdsaSha384);

        let err = backend
            .create_unsealing_session(
                &sealed.sealed_blob,
                &der,
                &[SignatureAlgorithm::EcdsaSha512],
                false,
            )
            .err()
            .unwrap();
        assert_eq!(err.kind, BackendErrorKind::Unsupported);
    }

    #[test]
    fn test_user_lock_restriction() {
        let backend = SoftwareSealingBackend::new();
        let (_, der) = key();
        let sealed = backend
            .create_sealed_secret(&der, ALGS, &PlatformRestrictions::for_user("user-hash"), "user-hash")
            .unwrap();

        // Before the user PCR is extended only the unlocked form is usable
        assert!(backend
            .create_unsealing_session(&sealed.sealed_blob, &der, ALGS, false)
            .is_ok());
        let err = backend
            .create_unsealing_session(&sealed.sealed_blob, &der, ALGS, true)
            .err()
            .unwrap();
        assert_eq!(err.kind, BackendErrorKind::PlatformState);

        backend.extend_pcr(USER_PCR_INDEX, b"user-hash").unwrap();
        assert!(backend
            .create_unsealing_session(&sealed.sealed_blob, &der, ALGS, true)
            .is_ok());
        assert!(backend
            .create_unsealing_session(&sealed.sealed_blob, &der, ALGS, false)
            .is_err());
    }

    #[test]
    fn test_tampered_blob_rejected() {
        let backend = SoftwareSealingBackend::new();
        let (_, der) = key();
        let mut blob = backend
            .create_sealed_secret(&der, ALGS, &PlatformRestrictions::default(), "user")
            .unwrap()
            .sealed_blob;
        let last = blob.len() - 1;
        blob[last] ^= 1;

        assert!(backend.create_unsealing_session(&blob, &der, ALGS, false).is_err());
        assert!(backend.create_unsealing_session(&[1, 2, 3], &der, ALGS, false).is_err());
    }
}
