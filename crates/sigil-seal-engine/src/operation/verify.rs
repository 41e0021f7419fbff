//! VerifyKey: check that a signing authority is reachable and its key works
//!
//! Never touches the sealing backend. Every failure resolves `false`: a key
//! that does not currently verify is an expected outcome here.

use rand::RngCore;
use tracing::{debug, info, warn};

use sigil_seal_core::{verify_signature, SignatureAlgorithm, VERIFY_CHALLENGE_BYTES};

use super::{OperationCore, Progress};
use crate::engine::VerifyKeyRequest;
use crate::transport::{ChallengeKind, ChallengeTransport, SignatureEvent, SignatureRequest};

enum VerifyState {
    NotStarted,
    AwaitingSignature {
        challenge: Vec<u8>,
        algorithm: SignatureAlgorithm,
    },
    Resolved,
}

pub(crate) struct VerifyKeyOperation {
    core: OperationCore,
    request: VerifyKeyRequest,
    state: VerifyState,
}

impl VerifyKeyOperation {
    pub fn new(request: VerifyKeyRequest) -> Self {
        Self {
            core: OperationCore::new(),
            request,
            state: VerifyState::NotStarted,
        }
    }

    pub fn core_mut(&mut self) -> &mut OperationCore {
        &mut self.core
    }

    pub fn start(&mut self, transport: &mut dyn ChallengeTransport) -> Progress<bool> {
        let Some(algorithm) = self.request.public_key_info.challenge_algorithm() else {
            warn!("VerifyKey called without signature algorithms");
            return self.resolve(false);
        };

        let mut challenge = vec![0u8; VERIFY_CHALLENGE_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut challenge);

        info!(
            "Verifying key for account {} with {}",
            self.request.account_id, algorithm
        );
        transport.request_signature(
            SignatureRequest {
                account_id: self.request.account_id.clone(),
                public_key_der: self.request.public_key_info.public_key_der.clone(),
                data: challenge.clone(),
                algorithm,
            },
            self.core.responder(ChallengeKind::Verify),
        );

        self.state = VerifyState::AwaitingSignature {
            challenge,
            algorithm,
        };
        Progress::Pending
    }

    pub fn on_signature(&mut self, event: SignatureEvent) -> Progress<bool> {
        if self.core.is_resolved() {
            return Progress::Pending;
        }
        if event.kind != ChallengeKind::Verify {
            debug!("Ignoring unexpected {:?} reply during VerifyKey", event.kind);
            return Progress::Pending;
        }

        let (challenge, algorithm) = match std::mem::replace(&mut self.state, VerifyState::Resolved)
        {
            VerifyState::AwaitingSignature {
                challenge,
                algorithm,
            } => (challenge, algorithm),
            other => {
                self.state = other;
                return Progress::Pending;
            }
        };

        let valid = match event.reply {
            Ok(signature) => match verify_signature(
                &self.request.public_key_info.public_key_der,
                algorithm,
                &challenge,
                &signature,
            ) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Key verification failed: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("Key verification signature not obtained: {}", e);
                false
            }
        };

        info!(
            "VerifyKey complete for account {}: {}",
            self.request.account_id,
            if valid { "valid" } else { "invalid" }
        );
        self.resolve(valid)
    }

    pub fn abort(&mut self) {
        self.state = VerifyState::Resolved;
        self.core.resolve();
    }

    fn resolve(&mut self, valid: bool) -> Progress<bool> {
        self.state = VerifyState::Resolved;
        self.core.resolve();
        Progress::Resolved(valid)
    }
}
