//! Challenge-credential auth block
//!
//! Create runs GenerateNew through the engine and derives key material from
//! the resulting passkey; Derive runs Decrypt with the persisted challenge
//! info and repeats the derivation.

use std::sync::Arc;

use tracing::{debug, info};

use sigil_seal_core::{
    Error as SealError, Passkey, PlatformRestrictions, PublicKeyInfo, SignatureAlgorithm,
};
use sigil_seal_engine::{ChallengeTransport, DecryptRequest, EngineHandle, GenerateNewRequest};

use crate::error::{AuthBlockError, Result};
use crate::kdf::{KdfState, KeyBlobs, KeyDerivationBlock};
use crate::state::{AuthBlockState, ChallengeCredentialState};

/// Challenge credential presented by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeCredentialInput {
    /// SubjectPublicKeyInfo DER; only used by Create
    pub public_key_der: Vec<u8>,
    /// Algorithms the signing authority currently supports, most preferred first
    pub algorithms: Vec<SignatureAlgorithm>,
}

/// Input of Create and Derive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInput {
    pub account_id: String,
    pub obfuscated_username: String,
    pub locked_to_single_user: bool,
    pub challenge_credential: Option<ChallengeCredentialInput>,
}

/// Auth block backed by a challenge-response sealed secret
pub struct ChallengeCredentialAuthBlock {
    engine: EngineHandle,
    kdf: Arc<dyn KeyDerivationBlock>,
}

impl ChallengeCredentialAuthBlock {
    pub fn new(engine: EngineHandle, kdf: Arc<dyn KeyDerivationBlock>) -> Self {
        Self { engine, kdf }
    }

    /// Seal a new secret and derive fresh key material from its passkey
    pub async fn create(
        &self,
        input: &AuthInput,
        transport: impl ChallengeTransport + 'static,
    ) -> Result<(AuthBlockState, KeyBlobs)> {
        if input.obfuscated_username.is_empty() {
            return Err(SealError::InvalidInput("missing obfuscated username".to_string()).into());
        }
        let credential = challenge_credential(input)?;
        if credential.algorithms.is_empty() {
            return Err(SealError::NoAlgorithms.into());
        }

        info!("Creating challenge credential auth block for {}", input.account_id);
        let result = self
            .engine
            .generate_new(
                GenerateNewRequest {
                    account_id: input.account_id.clone(),
                    public_key_info: PublicKeyInfo::new(
                        credential.public_key_der.clone(),
                        credential.algorithms.clone(),
                    ),
                    restrictions: PlatformRestrictions::for_user(&input.obfuscated_username),
                    obfuscated_username: input.obfuscated_username.clone(),
                },
                transport,
            )
            .await?;

        let challenge_info = result.challenge_info.ok_or_else(|| {
            AuthBlockError::InvalidState("GenerateNew returned no challenge info".to_string())
        })?;
        let (blobs, kdf_state) = self.kdf_create(result.passkey).await?;
        debug!("Key material derived for {}", input.account_id);

        Ok((
            AuthBlockState::ChallengeCredential(ChallengeCredentialState {
                kdf_state,
                challenge_info,
            }),
            blobs,
        ))
    }

    /// Recover the passkey and repeat the recorded derivation
    pub async fn derive(
        &self,
        input: &AuthInput,
        state: &AuthBlockState,
        transport: impl ChallengeTransport + 'static,
    ) -> Result<KeyBlobs> {
        let AuthBlockState::ChallengeCredential(state) = state else {
            return Err(AuthBlockError::InvalidState(format!(
                "expected challenge_credential state, found {}",
                state.kind()
            )));
        };
        if state.challenge_info.salt_signature_algorithm.is_none() {
            return Err(AuthBlockError::InvalidState(
                "challenge info has no salt signature algorithm".to_string(),
            ));
        }
        let credential = challenge_credential(input)?;

        info!("Deriving challenge credential auth block for {}", input.account_id);
        let result = self
            .engine
            .decrypt(
                DecryptRequest {
                    account_id: input.account_id.clone(),
                    public_key_info: PublicKeyInfo::new(
                        state.challenge_info.public_key_der.clone(),
                        credential.algorithms.clone(),
                    ),
                    challenge_info: state.challenge_info.clone(),
                    locked_to_single_user: input.locked_to_single_user,
                },
                transport,
            )
            .await?;

        self.kdf_derive(result.passkey, state.kdf_state.clone()).await
    }

    // Argon2 is memory-hard; keep it off the runtime the engine runs on
    async fn kdf_create(&self, passkey: Passkey) -> Result<(KeyBlobs, KdfState)> {
        let kdf = Arc::clone(&self.kdf);
        tokio::task::spawn_blocking(move || kdf.create(passkey.as_bytes()))
            .await
            .map_err(|e| AuthBlockError::Kdf(format!("Task join error: {}", e)))?
    }

    async fn kdf_derive(&self, passkey: Passkey, state: KdfState) -> Result<KeyBlobs> {
        let kdf = Arc::clone(&self.kdf);
        tokio::task::spawn_blocking(move || kdf.derive(passkey.as_bytes(), &state))
            .await
            .map_err(|e| AuthBlockError::Kdf(format!("Task join error: {}", e)))?
    }
}

fn challenge_credential(input: &AuthInput) -> Result<&ChallengeCredentialInput> {
    input.challenge_credential.as_ref().ok_or_else(|| {
        SealError::InvalidInput("missing challenge credential input".to_string()).into()
    })
}
