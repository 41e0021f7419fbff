//! Challenge transport backed by an in-process signing key
//!
//! Answers every request synchronously. Used by the CLI self-tests and by
//! tests; a real deployment talks to a smart card or a platform key instead.

use k256::ecdsa::SigningKey;
use tracing::debug;

use sigil_seal_core::crypto::{encode_public_key, sign};
use sigil_seal_core::Result;

use crate::transport::{ChallengeTransport, SignatureRequest, SignatureResponder, TransportError};

/// Signs challenges with a local secp256k1 key
#[derive(Clone)]
pub struct LocalKeyTransport {
    key: SigningKey,
    public_key_der: Vec<u8>,
}

impl LocalKeyTransport {
    pub fn new(key: SigningKey) -> Result<Self> {
        let public_key_der = encode_public_key(key.verifying_key())?;
        Ok(Self {
            key,
            public_key_der,
        })
    }

    /// Transport with a fresh random key
    pub fn random() -> Result<Self> {
        Self::new(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// SubjectPublicKeyInfo DER of the signing key
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }
}

impl ChallengeTransport for LocalKeyTransport {
    fn request_signature(&mut self, request: SignatureRequest, responder: SignatureResponder) {
        if request.public_key_der != self.public_key_der {
            responder.respond(Err(TransportError::NoSignature(
                "requested key is not available".to_string(),
            )));
            return;
        }

        debug!(
            "Signing {:?} challenge for account {} with {}",
            responder.kind(),
            request.account_id,
            request.algorithm
        );
        let reply = sign(&self.key, request.algorithm, &request.data)
            .map_err(|e| TransportError::NoSignature(e.to_string()));
        responder.respond(reply);
    }
}

impl std::fmt::Debug for LocalKeyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyTransport")
            .field("public_key_der", &key_fingerprint(&self.public_key_der))
            .finish()
    }
}

fn key_fingerprint(bytes: &[u8]) -> String {
    hex::encode(&bytes[bytes.len().saturating_sub(8)..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_shows_key_tail_only() {
        let transport = LocalKeyTransport::random().unwrap();
        let der = transport.public_key_der();
        let debug = format!("{:?}", transport);
        assert!(debug.contains(&hex::encode(&der[der.len() - 8..])));
        assert!(!debug.contains(&hex::encode(der)));
    }

    #[test]
    fn test_fingerprint_of_short_input() {
        assert_eq!(key_fingerprint(&[0xab, 0x01]), "ab01");
        assert_eq!(key_fingerprint(&[]), "");
    }
}
