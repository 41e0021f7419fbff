//! GenerateNew: seal a fresh secret and sign a fresh salt

use tracing::{debug, error, info};

use sigil_seal_core::{
    combine_passkey, generate_salt, ChallengeInfo, Error, GenerateOrDecryptResult, Result,
    SignatureAlgorithm,
};

use super::{OperationCore, Progress};
use crate::backend::{SealedSecret, SealingBackend};
use crate::engine::GenerateNewRequest;
use crate::transport::{ChallengeKind, ChallengeTransport, SignatureEvent, SignatureRequest};

enum GenerateState {
    NotStarted,
    /// Secret sealed; salt signature outstanding
    AwaitingSaltSignature {
        sealed: SealedSecret,
        salt: Vec<u8>,
        salt_algorithm: SignatureAlgorithm,
    },
    Resolved,
}

pub(crate) struct GenerateNewOperation {
    core: OperationCore,
    request: GenerateNewRequest,
    state: GenerateState,
}

impl GenerateNewOperation {
    pub fn new(request: GenerateNewRequest) -> Self {
        Self {
            core: OperationCore::new(),
            request,
            state: GenerateState::NotStarted,
        }
    }

    pub fn core_mut(&mut self) -> &mut OperationCore {
        &mut self.core
    }

    /// Request the salt signature, then seal a new secret
    ///
    /// A transport that answers synchronously has its reply queued and applied
    /// only after sealing, so reply order never matters.
    pub fn start(
        &mut self,
        backend: &dyn SealingBackend,
        transport: &mut dyn ChallengeTransport,
    ) -> Progress<Result<GenerateOrDecryptResult>> {
        let key_info = &self.request.public_key_info;
        if key_info.algorithms.is_empty() {
            error!("GenerateNew called without signature algorithms");
            return self.resolve(Err(Error::NoAlgorithms));
        }
        if key_info.public_key_der.is_empty() {
            return self.resolve(Err(Error::InvalidInput(
                "public key is empty".to_string(),
            )));
        }
        let Some(salt_algorithm) = key_info.challenge_algorithm() else {
            return self.resolve(Err(Error::NoAlgorithms));
        };

        info!(
            "Generating sealed secret for account {} (salt algorithm {})",
            self.request.account_id, salt_algorithm
        );

        let salt = generate_salt();
        transport.request_signature(
            SignatureRequest {
                account_id: self.request.account_id.clone(),
                public_key_der: key_info.public_key_der.clone(),
                data: salt.clone(),
                algorithm: salt_algorithm,
            },
            self.core.responder(ChallengeKind::Salt),
        );

        let sealed = match backend.create_sealed_secret(
            &key_info.public_key_der,
            &key_info.algorithms,
            &self.request.restrictions,
            &self.request.obfuscated_username,
        ) {
            Ok(sealed) => sealed,
            Err(e) => {
                error!("Failed to create sealed secret: {}", e);
                return self.resolve(Err(e.into()));
            }
        };
        debug!("Sealed secret created, awaiting salt signature");

        self.state = GenerateState::AwaitingSaltSignature {
            sealed,
            salt,
            salt_algorithm,
        };
        Progress::Pending
    }

    pub fn on_signature(
        &mut self,
        event: SignatureEvent,
    ) -> Progress<Result<GenerateOrDecryptResult>> {
        if self.core.is_resolved() {
            return Progress::Pending;
        }
        if event.kind != ChallengeKind::Salt {
            debug!("Ignoring unexpected {:?} reply during GenerateNew", event.kind);
            return Progress::Pending;
        }

        let (sealed, salt, salt_algorithm) =
            match std::mem::replace(&mut self.state, GenerateState::Resolved) {
                GenerateState::AwaitingSaltSignature {
                    sealed,
                    salt,
                    salt_algorithm,
                } => (sealed, salt, salt_algorithm),
                other => {
                    self.state = other;
                    return Progress::Pending;
                }
            };

        let salt_signature = match event.reply {
            Ok(signature) => signature,
            Err(e) => {
                error!("Salt signature not obtained: {}", e);
                return self.resolve(Err(e.into()));
            }
        };

        let passkey = combine_passkey(&sealed.secret, &salt_signature);
        let challenge_info = ChallengeInfo {
            public_key_der: self.request.public_key_info.public_key_der.clone(),
            sealed_secret: sealed.sealed_blob,
            salt,
            salt_signature_algorithm: Some(salt_algorithm),
        };

        info!("GenerateNew complete for account {}", self.request.account_id);
        self.resolve(Ok(GenerateOrDecryptResult::generated(challenge_info, passkey)))
    }

    pub fn abort(&mut self) {
        if !self.core.is_resolved() {
            debug!("Aborting GenerateNew for account {}", self.request.account_id);
        }
        self.state = GenerateState::Resolved;
        self.core.resolve();
    }

    fn resolve(
        &mut self,
        result: Result<GenerateOrDecryptResult>,
    ) -> Progress<Result<GenerateOrDecryptResult>> {
        self.state = GenerateState::Resolved;
        self.core.resolve();
        Progress::Resolved(result)
    }
}
