//! Decrypt: recover a passkey from persisted challenge info
//!
//! Two signatures are outstanding at once: one over the persisted salt (with
//! the algorithm persisted next to it) and one over the unsealing challenge
//! (with the algorithm the backend picked from the caller's *current*
//! preference list). They may arrive in either order.

use tracing::{debug, error, info};

use sigil_seal_core::{combine_passkey, Error, GenerateOrDecryptResult, Result};

use super::{OperationCore, Progress};
use crate::backend::{SealingBackend, UnsealingSession};
use crate::engine::DecryptRequest;
use crate::transport::{ChallengeKind, ChallengeTransport, SignatureEvent, SignatureRequest};

enum DecryptState {
    NotStarted,
    AwaitingSaltAndChallenge {
        session: Box<dyn UnsealingSession>,
    },
    /// Unsealing challenge signed; salt signature outstanding
    AwaitingSalt {
        session: Box<dyn UnsealingSession>,
        challenge_signature: Vec<u8>,
    },
    /// Salt signed; unsealing challenge signature outstanding
    AwaitingChallenge {
        session: Box<dyn UnsealingSession>,
        salt_signature: Vec<u8>,
    },
    Resolved,
}

pub(crate) struct DecryptOperation {
    core: OperationCore,
    request: DecryptRequest,
    state: DecryptState,
}

impl DecryptOperation {
    pub fn new(request: DecryptRequest) -> Self {
        Self {
            core: OperationCore::new(),
            request,
            state: DecryptState::NotStarted,
        }
    }

    pub fn core_mut(&mut self) -> &mut OperationCore {
        &mut self.core
    }

    /// Give the request back for a retry
    pub fn into_request(self) -> DecryptRequest {
        self.request
    }

    pub fn start(
        &mut self,
        backend: &dyn SealingBackend,
        transport: &mut dyn ChallengeTransport,
    ) -> Progress<Result<GenerateOrDecryptResult>> {
        let salt_algorithm = match self.request.challenge_info.validate() {
            Ok(algorithm) => algorithm,
            Err(e) => {
                error!("Persisted challenge info rejected: {}", e);
                return self.resolve(Err(e));
            }
        };
        if self.request.public_key_info.algorithms.is_empty() {
            error!("Decrypt called without signature algorithms");
            return self.resolve(Err(Error::NoAlgorithms));
        }

        info!(
            "Decrypting sealed secret for account {}",
            self.request.account_id
        );

        let public_key_der = self.request.public_key_info.public_key_der.clone();
        transport.request_signature(
            SignatureRequest {
                account_id: self.request.account_id.clone(),
                public_key_der: public_key_der.clone(),
                data: self.request.challenge_info.salt.clone(),
                algorithm: salt_algorithm,
            },
            self.core.responder(ChallengeKind::Salt),
        );

        let session = match backend.create_unsealing_session(
            &self.request.challenge_info.sealed_secret,
            &public_key_der,
            &self.request.public_key_info.algorithms,
            self.request.locked_to_single_user,
        ) {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to start unsealing session: {}", e);
                return self.resolve(Err(e.into()));
            }
        };
        debug!(
            "Unsealing session started (salt algorithm {}, challenge algorithm {})",
            salt_algorithm,
            session.challenge_algorithm()
        );

        transport.request_signature(
            SignatureRequest {
                account_id: self.request.account_id.clone(),
                public_key_der,
                data: session.challenge_value().to_vec(),
                algorithm: session.challenge_algorithm(),
            },
            self.core.responder(ChallengeKind::Unseal),
        );

        self.state = DecryptState::AwaitingSaltAndChallenge { session };
        Progress::Pending
    }

    pub fn on_signature(
        &mut self,
        event: SignatureEvent,
    ) -> Progress<Result<GenerateOrDecryptResult>> {
        if self.core.is_resolved() {
            return Progress::Pending;
        }

        let signature = match event.reply {
            Ok(signature) => signature,
            Err(e) => {
                error!("{:?} signature not obtained: {}", event.kind, e);
                return self.resolve(Err(e.into()));
            }
        };

        let state = std::mem::replace(&mut self.state, DecryptState::Resolved);
        self.state = match (state, event.kind) {
            (DecryptState::AwaitingSaltAndChallenge { session }, ChallengeKind::Salt) => {
                debug!("Salt signature arrived first");
                DecryptState::AwaitingChallenge {
                    session,
                    salt_signature: signature,
                }
            }
            (DecryptState::AwaitingSaltAndChallenge { session }, ChallengeKind::Unseal) => {
                debug!("Unsealing challenge signature arrived first");
                DecryptState::AwaitingSalt {
                    session,
                    challenge_signature: signature,
                }
            }
            (
                DecryptState::AwaitingSalt {
                    session,
                    challenge_signature,
                },
                ChallengeKind::Salt,
            ) => return self.finish(session, &challenge_signature, &signature),
            (DecryptState::AwaitingChallenge { session, salt_signature }, ChallengeKind::Unseal) => {
                return self.finish(session, &signature, &salt_signature)
            }
            (state, kind) => {
                debug!("Ignoring unexpected {:?} reply during Decrypt", kind);
                state
            }
        };
        Progress::Pending
    }

    pub fn abort(&mut self) {
        if !self.core.is_resolved() {
            debug!("Aborting Decrypt for account {}", self.request.account_id);
        }
        self.state = DecryptState::Resolved;
        self.core.resolve();
    }

    fn finish(
        &mut self,
        session: Box<dyn UnsealingSession>,
        challenge_signature: &[u8],
        salt_signature: &[u8],
    ) -> Progress<Result<GenerateOrDecryptResult>> {
        let secret = match session.unseal(challenge_signature) {
            Ok(secret) => secret,
            Err(e) => {
                error!("Unsealing failed: {}", e);
                return self.resolve(Err(e.into()));
            }
        };

        let passkey = combine_passkey(&secret, salt_signature);
        info!("Decrypt complete for account {}", self.request.account_id);
        self.resolve(Ok(GenerateOrDecryptResult::decrypted(passkey)))
    }

    fn resolve(
        &mut self,
        result: Result<GenerateOrDecryptResult>,
    ) -> Progress<Result<GenerateOrDecryptResult>> {
        self.state = DecryptState::Resolved;
        self.core.resolve();
        Progress::Resolved(result)
    }
}
