//! Persisted challenge metadata and operation results

use serde::{Deserialize, Serialize};

use crate::algorithm::SignatureAlgorithm;
use crate::error::{Error, Result};
use crate::salt::validate_salt;
use crate::secret::Passkey;

/// Metadata produced by GenerateNew and consumed by Decrypt
///
/// Everything needed to reconstruct the passkey, given the signing authority's
/// cooperation, lives here. None of it is secret on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeInfo {
    /// SubjectPublicKeyInfo DER of the signing authority's key
    #[serde(with = "crate::hex_bytes")]
    pub public_key_der: Vec<u8>,

    /// Opaque blob produced by the sealing backend
    #[serde(with = "crate::hex_bytes")]
    pub sealed_secret: Vec<u8>,

    /// `SALT_CONSTANT || random`
    #[serde(with = "crate::hex_bytes")]
    pub salt: Vec<u8>,

    /// Algorithm the salt is signed with; fixed at generation time
    #[serde(default)]
    pub salt_signature_algorithm: Option<SignatureAlgorithm>,
}

impl ChallengeInfo {
    /// Validate the fields Decrypt depends on, returning the salt algorithm
    pub fn validate(&self) -> Result<SignatureAlgorithm> {
        validate_salt(&self.salt)?;
        self.salt_signature_algorithm
            .ok_or(Error::MissingSaltAlgorithm)
    }
}

/// Successful outcome of GenerateNew or Decrypt
///
/// `challenge_info` is only present for GenerateNew.
#[derive(Debug)]
pub struct GenerateOrDecryptResult {
    pub challenge_info: Option<ChallengeInfo>,
    pub passkey: Passkey,
}

impl GenerateOrDecryptResult {
    pub fn generated(challenge_info: ChallengeInfo, passkey: Passkey) -> Self {
        Self {
            challenge_info: Some(challenge_info),
            passkey,
        }
    }

    pub fn decrypted(passkey: Passkey) -> Self {
        Self {
            challenge_info: None,
            passkey,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::salt::{generate_salt, SALT_CONSTANT};

    fn sample_info() -> ChallengeInfo {
        ChallengeInfo {
            public_key_der: vec![0x30, 0x56],
            sealed_secret: vec![1, 2, 3],
            salt: generate_salt(),
            salt_signature_algorithm: Some(SignatureAlgorithm::EcdsaSha256),
        }
    }

    #[test]
    fn test_validate_ok() {
        assert_eq!(
            sample_info().validate().unwrap(),
            SignatureAlgorithm::EcdsaSha256
        );
    }

    #[test]
    fn test_validate_missing_algorithm() {
        let mut info = sample_info();
        info.salt_signature_algorithm = None;
        assert_eq!(info.validate(), Err(Error::MissingSaltAlgorithm));
    }

    #[test]
    fn test_validate_checks_salt_first() {
        let mut info = sample_info();
        info.salt = SALT_CONSTANT.to_vec();
        info.salt_signature_algorithm = None;
        assert!(matches!(info.validate(), Err(Error::MalformedSalt(_))));
    }

    #[test]
    fn test_json_hex_encoding() {
        let info = sample_info();
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"sealed_secret\":\"010203\""));
        let parsed: ChallengeInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, info);
    }
}
