//! Persisted auth block state

use serde::{Deserialize, Serialize};

use sigil_seal_core::ChallengeInfo;

use crate::error::Result;
use crate::kdf::KdfState;

/// State of a challenge-credential auth block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeCredentialState {
    pub kdf_state: KdfState,
    pub challenge_info: ChallengeInfo,
}

/// Persisted auth block state, by auth block kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthBlockState {
    ChallengeCredential(ChallengeCredentialState),
    Password(KdfState),
}

impl AuthBlockState {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthBlockState::ChallengeCredential(_) => "challenge_credential",
            AuthBlockState::Password(_) => "password",
        }
    }

    /// Parse persisted JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
