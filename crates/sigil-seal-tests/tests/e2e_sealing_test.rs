//! End-to-end tests for challenge-response credential sealing
//!
//! These tests drive the full stack: configuration, engine, auth block and
//! persisted state, against the software sealing backend.

use std::sync::Arc;

use sigil_seal_auth::{
    Argon2KeyDerivation, AuthBlockError, AuthBlockState, AuthInput, ChallengeCredentialAuthBlock,
    ChallengeCredentialInput, KdfParams, SealConfig,
};
use sigil_seal_core::{BackendErrorKind, Error, ErrorCategory, SignatureAlgorithm, USER_PCR_INDEX};
use sigil_seal_engine::{ChallengeCredentialsEngine, LocalKeyTransport, SoftwareSealingBackend};

const STORAGE_KEY: [u8; 32] = [0x5a; 32];
const USER: &str = "9f86d081884c7d65";

fn test_config() -> SealConfig {
    SealConfig {
        kdf: KdfParams {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        },
        ..Default::default()
    }
}

fn auth_block(
    config: &SealConfig,
    backend: Arc<SoftwareSealingBackend>,
) -> ChallengeCredentialAuthBlock {
    let engine = ChallengeCredentialsEngine::spawn(backend, config.engine.capabilities());
    ChallengeCredentialAuthBlock::new(engine, Arc::new(Argon2KeyDerivation::new(config.kdf)))
}

fn input(signer: &LocalKeyTransport, algorithms: Vec<SignatureAlgorithm>) -> AuthInput {
    AuthInput {
        account_id: "user@example.com".to_string(),
        obfuscated_username: USER.to_string(),
        locked_to_single_user: false,
        challenge_credential: Some(ChallengeCredentialInput {
            public_key_der: signer.public_key_der().to_vec(),
            algorithms,
        }),
    }
}

/// Create, persist, restart, derive
#[tokio::test]
async fn test_full_credential_lifecycle() {
    // ==========================================
    // STEP 1: Configuration
    // ==========================================
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.json");
    test_config().save(&config_path).unwrap();
    let config = SealConfig::load(&config_path).unwrap();

    // ==========================================
    // STEP 2: Create the auth block
    // ==========================================
    let signer = LocalKeyTransport::random().unwrap();
    let block = auth_block(
        &config,
        Arc::new(SoftwareSealingBackend::with_storage_key(STORAGE_KEY)),
    );
    let (state, created) = block
        .create(
            &input(&signer, vec![SignatureAlgorithm::EcdsaSha1, SignatureAlgorithm::EcdsaSha256]),
            signer.clone(),
        )
        .await
        .unwrap();

    let state_path = dir.path().join("auth_block.json");
    std::fs::write(&state_path, state.to_json().unwrap()).unwrap();

    // ==========================================
    // STEP 3: "Reboot" - new backend instance, new engine
    // ==========================================
    let block = auth_block(
        &config,
        Arc::new(SoftwareSealingBackend::with_storage_key(STORAGE_KEY)),
    );
    let state =
        AuthBlockState::from_json(&std::fs::read_to_string(&state_path).unwrap()).unwrap();

    // ==========================================
    // STEP 4: Derive
    // ==========================================
    let derived = block
        .derive(
            &input(&signer, vec![SignatureAlgorithm::EcdsaSha256]),
            &state,
            signer.clone(),
        )
        .await
        .unwrap();
    assert_eq!(created, derived);

    // A different storage key cannot open the sealed secret
    let block = auth_block(&config, Arc::new(SoftwareSealingBackend::new()));
    let err = block
        .derive(
            &input(&signer, vec![SignatureAlgorithm::EcdsaSha256]),
            &state,
            signer,
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::HardwareFatal);
}

#[tokio::test]
async fn test_locked_to_single_user() {
    let config = test_config();
    let backend = Arc::new(SoftwareSealingBackend::new());
    let block = auth_block(&config, backend.clone());
    let signer = LocalKeyTransport::random().unwrap();

    let (state, created) = block
        .create(&input(&signer, vec![SignatureAlgorithm::EcdsaSha256]), signer.clone())
        .await
        .unwrap();

    let mut locked = input(&signer, vec![SignatureAlgorithm::EcdsaSha256]);
    locked.locked_to_single_user = true;

    // The user PCR has not been extended yet
    let err = block.derive(&locked, &state, signer.clone()).await.unwrap_err();
    match err {
        AuthBlockError::Engine(Error::Backend(e)) => {
            assert_eq!(e.kind, BackendErrorKind::PlatformState)
        }
        other => panic!("unexpected error {:?}", other),
    }

    backend.extend_pcr(USER_PCR_INDEX, USER.as_bytes()).unwrap();
    let derived = block.derive(&locked, &state, signer.clone()).await.unwrap();
    assert_eq!(created, derived);
}

#[tokio::test]
async fn test_locked_to_other_user_fails() {
    let config = test_config();
    let backend = Arc::new(SoftwareSealingBackend::new());
    let block = auth_block(&config, backend.clone());
    let signer = LocalKeyTransport::random().unwrap();

    let (state, _) = block
        .create(&input(&signer, vec![SignatureAlgorithm::EcdsaSha256]), signer.clone())
        .await
        .unwrap();

    backend.extend_pcr(USER_PCR_INDEX, b"someone-else").unwrap();
    let mut locked = input(&signer, vec![SignatureAlgorithm::EcdsaSha256]);
    locked.locked_to_single_user = true;

    let err = block.derive(&locked, &state, signer).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::HardwareFatal);
}

#[tokio::test]
async fn test_vulnerable_hardware_requires_diagnostic_mode() {
    let signer = LocalKeyTransport::random().unwrap();
    let vulnerable = || Arc::new(SoftwareSealingBackend::new().with_roca_vulnerable(true));

    let production = test_config();
    let err = auth_block(&production, vulnerable())
        .create(&input(&signer, vec![SignatureAlgorithm::EcdsaSha256]), signer.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthBlockError::Engine(Error::HardwareNotReady(_))));

    let mut diagnostic = test_config();
    diagnostic.engine.diagnostic_mode = true;
    let block = auth_block(&diagnostic, vulnerable());
    let (state, created) = block
        .create(&input(&signer, vec![SignatureAlgorithm::EcdsaSha256]), signer.clone())
        .await
        .unwrap();
    let derived = block
        .derive(&input(&signer, vec![SignatureAlgorithm::EcdsaSha256]), &state, signer)
        .await
        .unwrap();
    assert_eq!(created, derived);
}
