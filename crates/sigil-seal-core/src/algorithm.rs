//! Challenge signature algorithms and the algorithm preference rule

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Signature algorithm a signing authority may be asked to use
///
/// All variants are ECDSA over secp256k1; they differ in the digest applied to
/// the challenge bytes before signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    EcdsaSha1,
    EcdsaSha256,
    EcdsaSha384,
    EcdsaSha512,
}

impl SignatureAlgorithm {
    /// All algorithms, strongest digest last
    pub const ALL: [SignatureAlgorithm; 4] = [
        SignatureAlgorithm::EcdsaSha1,
        SignatureAlgorithm::EcdsaSha256,
        SignatureAlgorithm::EcdsaSha384,
        SignatureAlgorithm::EcdsaSha512,
    ];

    /// SHA-1 is only used when nothing else is offered
    pub fn is_sha1(self) -> bool {
        matches!(self, SignatureAlgorithm::EcdsaSha1)
    }

    /// Stable name used in configuration and persisted state
    pub fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::EcdsaSha1 => "ecdsa-sha1",
            SignatureAlgorithm::EcdsaSha256 => "ecdsa-sha256",
            SignatureAlgorithm::EcdsaSha384 => "ecdsa-sha384",
            SignatureAlgorithm::EcdsaSha512 => "ecdsa-sha512",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignatureAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown signature algorithm: {}", s)))
    }
}

/// Public key of a signing authority plus the algorithms it supports
///
/// `algorithms` is in the caller's preference order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyInfo {
    /// SubjectPublicKeyInfo DER
    #[serde(with = "crate::hex_bytes")]
    pub public_key_der: Vec<u8>,
    /// Supported algorithms, most preferred first
    pub algorithms: Vec<SignatureAlgorithm>,
}

impl PublicKeyInfo {
    pub fn new(public_key_der: Vec<u8>, algorithms: Vec<SignatureAlgorithm>) -> Self {
        Self {
            public_key_der,
            algorithms,
        }
    }

    /// Algorithm to use for a challenge this engine chooses itself
    pub fn challenge_algorithm(&self) -> Option<SignatureAlgorithm> {
        choose_challenge_algorithm(&self.algorithms)
    }
}

/// Pick the algorithm for a self-chosen challenge (salt or key verification)
///
/// Walks the list in order and stops at the first non-SHA-1 entry. SHA-1 is
/// only returned when every entry is SHA-1.
pub fn choose_challenge_algorithm(algorithms: &[SignatureAlgorithm]) -> Option<SignatureAlgorithm> {
    let mut chosen = None;
    for &algorithm in algorithms {
        chosen = Some(algorithm);
        if !algorithm.is_sha1() {
            break;
        }
    }
    chosen
}
