//! Integration tests for the challenge-credential auth block

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use sigil_seal_auth::{
    Argon2KeyDerivation, AuthBlockError, AuthBlockState, AuthInput, ChallengeCredentialAuthBlock,
    ChallengeCredentialInput, KdfParams, KdfState, KeyBlobs, KeyDerivationBlock,
};
use sigil_seal_core::{Error, ErrorCategory, PublicKeyInfo, SignatureAlgorithm};
use sigil_seal_engine::{
    Capabilities, ChallengeCredentialsEngine, LocalKeyTransport, SoftwareSealingBackend,
    VerifyKeyRequest,
};

use SignatureAlgorithm::*;

fn cheap_kdf() -> Argon2KeyDerivation {
    Argon2KeyDerivation::new(KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
}

/// Holds `create` until released, reporting when it has been entered
struct GatedKdf {
    inner: Argon2KeyDerivation,
    entered: tokio::sync::mpsc::UnboundedSender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl KeyDerivationBlock for GatedKdf {
    fn create(&self, passkey: &[u8]) -> sigil_seal_auth::Result<(KeyBlobs, KdfState)> {
        let _ = self.entered.send(());
        self.release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| AuthBlockError::Kdf("never released".to_string()))?;
        self.inner.create(passkey)
    }

    fn derive(&self, passkey: &[u8], state: &KdfState) -> sigil_seal_auth::Result<KeyBlobs> {
        self.inner.derive(passkey, state)
    }
}

fn auth_block() -> ChallengeCredentialAuthBlock {
    let engine = ChallengeCredentialsEngine::spawn(
        Arc::new(SoftwareSealingBackend::new()),
        Capabilities::production(),
    );
    ChallengeCredentialAuthBlock::new(engine, Arc::new(cheap_kdf()))
}

fn input(signer: &LocalKeyTransport, algorithms: Vec<SignatureAlgorithm>) -> AuthInput {
    AuthInput {
        account_id: "user@example.com".to_string(),
        obfuscated_username: "a1b2c3d4".to_string(),
        locked_to_single_user: false,
        challenge_credential: Some(ChallengeCredentialInput {
            public_key_der: signer.public_key_der().to_vec(),
            algorithms,
        }),
    }
}

#[tokio::test]
async fn test_create_then_derive() {
    let block = auth_block();
    let signer = LocalKeyTransport::random().unwrap();

    let (state, created) = block
        .create(&input(&signer, vec![EcdsaSha256]), signer.clone())
        .await
        .unwrap();
    assert_eq!(state.kind(), "challenge_credential");

    let derived = block
        .derive(&input(&signer, vec![EcdsaSha256]), &state, signer.clone())
        .await
        .unwrap();
    assert_eq!(created, derived);
}

#[tokio::test]
async fn test_derive_from_persisted_json() {
    let block = auth_block();
    let signer = LocalKeyTransport::random().unwrap();

    let (state, created) = block
        .create(&input(&signer, vec![EcdsaSha1, EcdsaSha512]), signer.clone())
        .await
        .unwrap();
    let restored = AuthBlockState::from_json(&state.to_json().unwrap()).unwrap();

    // The algorithm list may change between Create and Derive
    let derived = block
        .derive(&input(&signer, vec![EcdsaSha1]), &restored, signer.clone())
        .await
        .unwrap();
    assert_eq!(created, derived);
}

#[tokio::test]
async fn test_derive_with_other_key_fails() {
    let block = auth_block();
    let signer = LocalKeyTransport::random().unwrap();
    let other = LocalKeyTransport::random().unwrap();

    let (state, _) = block
        .create(&input(&signer, vec![EcdsaSha256]), signer.clone())
        .await
        .unwrap();
    let err = block
        .derive(&input(&signer, vec![EcdsaSha256]), &state, other)
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::UserAuth);
}

#[tokio::test]
async fn test_create_validates_input() {
    let block = auth_block();
    let signer = LocalKeyTransport::random().unwrap();

    let mut missing_user = input(&signer, vec![EcdsaSha256]);
    missing_user.obfuscated_username.clear();
    let err = block.create(&missing_user, signer.clone()).await.unwrap_err();
    assert!(matches!(err, AuthBlockError::Engine(Error::InvalidInput(_))));

    let err = block
        .create(&input(&signer, vec![]), signer.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthBlockError::Engine(Error::NoAlgorithms)));

    let mut no_credential = input(&signer, vec![EcdsaSha256]);
    no_credential.challenge_credential = None;
    let err = block.create(&no_credential, signer.clone()).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Developer);
}

#[tokio::test]
async fn test_derive_rejects_wrong_state() {
    let block = auth_block();
    let signer = LocalKeyTransport::random().unwrap();

    let password = AuthBlockState::Password(KdfState {
        vkk_salt: vec![0; 16],
        chaps_salt: vec![1; 16],
        reset_seed_salt: vec![2; 16],
        params: KdfParams::default(),
    });
    let err = block
        .derive(&input(&signer, vec![EcdsaSha256]), &password, signer.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthBlockError::InvalidState(_)));

    let (state, _) = block
        .create(&input(&signer, vec![EcdsaSha256]), signer.clone())
        .await
        .unwrap();
    let AuthBlockState::ChallengeCredential(mut state) = state else {
        panic!("unexpected state kind");
    };
    state.challenge_info.salt_signature_algorithm = None;
    let err = block
        .derive(
            &input(&signer, vec![EcdsaSha256]),
            &AuthBlockState::ChallengeCredential(state),
            signer.clone(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthBlockError::InvalidState(_)));
    assert_eq!(err.category(), ErrorCategory::Developer);
}

#[tokio::test(flavor = "current_thread")]
async fn test_key_derivation_does_not_block_engine() {
    let engine = ChallengeCredentialsEngine::spawn(
        Arc::new(SoftwareSealingBackend::new()),
        Capabilities::production(),
    );
    let (entered_tx, mut entered_rx) = tokio::sync::mpsc::unbounded_channel();
    let (release_tx, release_rx) = mpsc::channel();
    let kdf = GatedKdf {
        inner: cheap_kdf(),
        entered: entered_tx,
        release: Mutex::new(release_rx),
    };
    let block = ChallengeCredentialAuthBlock::new(engine.clone(), Arc::new(kdf));
    let signer = LocalKeyTransport::random().unwrap();

    let create_input = input(&signer, vec![EcdsaSha256]);
    let create_signer = signer.clone();
    let creating =
        tokio::spawn(async move { block.create(&create_input, create_signer).await });
    entered_rx.recv().await.unwrap();

    // Key derivation is in progress; the engine still answers on this thread
    let valid = engine
        .verify_key(
            VerifyKeyRequest {
                account_id: "user@example.com".to_string(),
                public_key_info: PublicKeyInfo::new(
                    signer.public_key_der().to_vec(),
                    vec![EcdsaSha256],
                ),
            },
            signer.clone(),
        )
        .await
        .unwrap();
    assert!(valid);

    release_tx.send(()).unwrap();
    let (state, _) = creating.await.unwrap().unwrap();
    assert_eq!(state.kind(), "challenge_credential");
}
