//! Cryptographic primitives for challenge-response sealing

use k256::ecdsa::{
    signature::hazmat::{PrehashSigner, PrehashVerifier},
    Signature, SigningKey, VerifyingKey,
};
use k256::pkcs8::{DecodePublicKey, EncodePublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::algorithm::SignatureAlgorithm;
use crate::error::{Error, Result};
use crate::secret::{Passkey, SecretValue};

/// Hash `data` with the digest of `algorithm`
pub fn digest(algorithm: SignatureAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        SignatureAlgorithm::EcdsaSha1 => Sha1::digest(data).to_vec(),
        SignatureAlgorithm::EcdsaSha256 => Sha256::digest(data).to_vec(),
        SignatureAlgorithm::EcdsaSha384 => Sha384::digest(data).to_vec(),
        SignatureAlgorithm::EcdsaSha512 => Sha512::digest(data).to_vec(),
    }
}

/// Hash data using SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple pieces of data using SHA256
pub fn sha256_multi(data: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for d in data {
        hasher.update(d);
    }
    hasher.finalize().into()
}

/// Parse a SubjectPublicKeyInfo DER public key
pub fn parse_public_key(public_key_der: &[u8]) -> Result<VerifyingKey> {
    VerifyingKey::from_public_key_der(public_key_der)
        .map_err(|e| Error::InvalidPublicKey(e.to_string()))
}

/// Encode a public key as SubjectPublicKeyInfo DER
pub fn encode_public_key(key: &VerifyingKey) -> Result<Vec<u8>> {
    key.to_public_key_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| Error::Crypto(format!("Failed to encode public key: {}", e)))
}

/// Sign `data` with `algorithm`, returning a DER signature
pub fn sign(key: &SigningKey, algorithm: SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    let prehash = digest(algorithm, data);
    let signature: Signature = key
        .sign_prehash(&prehash)
        .map_err(|e| Error::Crypto(format!("Signing failed: {}", e)))?;
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Verify a DER signature over `data` made with `algorithm`
pub fn verify_signature(
    public_key_der: &[u8],
    algorithm: SignatureAlgorithm,
    data: &[u8],
    signature: &[u8],
) -> Result<()> {
    let verifying_key = parse_public_key(public_key_der)?;
    let signature =
        Signature::from_der(signature).map_err(|_| Error::SignatureVerificationFailed)?;
    let prehash = digest(algorithm, data);

    verifying_key
        .verify_prehash(&prehash, &signature)
        .map_err(|_| Error::SignatureVerificationFailed)
}

/// Combine the sealed secret and the salt signature into the passkey
///
/// `passkey = secret || SHA-256(salt_signature)`. GenerateNew and Decrypt
/// MUST produce identical bytes for the same inputs.
pub fn combine_passkey(secret: &SecretValue, salt_signature: &[u8]) -> Passkey {
    let signature_hash = sha256(salt_signature);
    let mut bytes = Vec::with_capacity(secret.len() + signature_hash.len());
    bytes.extend_from_slice(secret.as_bytes());
    bytes.extend_from_slice(&signature_hash);
    Passkey::new(bytes)
}
