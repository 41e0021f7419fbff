//! Sealing backend abstraction
//!
//! A sealing backend is a hardware security module that can generate a random
//! secret and seal it so that it is only released in exchange for a valid
//! signature, by a given public key, over a challenge the backend picks. The
//! sealed blob is additionally bound to platform state (PCR values).
//!
//! All calls are synchronous from the engine's point of view.

use sigil_seal_core::{BackendError, PlatformRestrictions, SecretValue, SignatureAlgorithm};

/// Output of sealing a fresh secret
#[derive(Debug)]
pub struct SealedSecret {
    /// The random secret, in the clear
    pub secret: SecretValue,
    /// Opaque blob from which the backend can recover `secret`
    pub sealed_blob: Vec<u8>,
}

/// Trait for hardware sealing backends
pub trait SealingBackend: Send + Sync {
    /// Generate a random secret and seal it to `public_key_der`
    ///
    /// # Arguments
    /// * `public_key_der` - SubjectPublicKeyInfo DER of the signing authority
    /// * `algorithms` - Algorithms the authority may be challenged with
    /// * `restrictions` - Platform states under which unsealing is allowed
    /// * `bound_user` - Obfuscated username the secret is bound to
    fn create_sealed_secret(
        &self,
        public_key_der: &[u8],
        algorithms: &[SignatureAlgorithm],
        restrictions: &PlatformRestrictions,
        bound_user: &str,
    ) -> Result<SealedSecret, BackendError>;

    /// Open a session that releases the secret in `sealed_blob`
    ///
    /// The backend picks the challenge algorithm among `algorithms` (the
    /// caller's current preference list), which may differ from the list used
    /// at sealing time.
    fn create_unsealing_session(
        &self,
        sealed_blob: &[u8],
        public_key_der: &[u8],
        algorithms: &[SignatureAlgorithm],
        locked_to_single_user: bool,
    ) -> Result<Box<dyn UnsealingSession>, BackendError>;

    /// Whether the storage root key was generated by a ROCA-vulnerable
    /// implementation (its RSA modulus is factorable)
    fn is_srk_roca_vulnerable(&self) -> Result<bool, BackendError>;

    /// Get the backend type name
    fn backend_type(&self) -> &'static str;
}

/// Pending unsealing of one sealed blob
pub trait UnsealingSession: Send {
    /// Bytes the signing authority has to sign
    fn challenge_value(&self) -> &[u8];

    /// Algorithm the signature over `challenge_value` must use
    fn challenge_algorithm(&self) -> SignatureAlgorithm;

    /// Exchange the challenge signature for the secret
    fn unseal(self: Box<Self>, signature: &[u8]) -> Result<SecretValue, BackendError>;
}
