//! Sigil Seal CLI - Self-tests for challenge-response credential sealing
//!
//! Runs the sealing flows end to end against the software sealing backend and
//! an in-process signing key, and manages the sealing configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sigil_seal_auth::{
    Argon2KeyDerivation, AuthBlockState, AuthInput, ChallengeCredentialAuthBlock,
    ChallengeCredentialInput, SealConfig,
};
use sigil_seal_core::crypto::sha256;
use sigil_seal_core::{PublicKeyInfo, SignatureAlgorithm, USER_PCR_INDEX};
use sigil_seal_engine::{
    ChallengeCredentialsEngine, EngineHandle, LocalKeyTransport, SoftwareSealingBackend,
    VerifyKeyRequest,
};

#[derive(Parser)]
#[command(name = "sigil-seal")]
#[command(about = "Challenge-response credential sealing self-tests", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to $SIGIL_SEAL_CONFIG or the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Operate on ROCA-vulnerable hardware regardless of configuration
    #[arg(long, global = true)]
    diagnostic: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an auth block and derive it again
    Roundtrip {
        /// Signature algorithms, most preferred first
        #[arg(short, long, value_delimiter = ',', default_value = "ecdsa-sha256")]
        algorithms: Vec<SignatureAlgorithm>,

        /// Algorithms offered at derive time (defaults to --algorithms)
        #[arg(long, value_delimiter = ',')]
        derive_algorithms: Option<Vec<SignatureAlgorithm>>,

        /// Obfuscated username the secret is bound to
        #[arg(short, long, default_value = "0123456789abcdef")]
        user: String,

        /// Derive in the locked-to-single-user platform state
        #[arg(long)]
        locked: bool,

        /// Write the persisted auth block state here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that a signing key answers challenges
    Verify {
        /// Signature algorithms, most preferred first
        #[arg(short, long, value_delimiter = ',', default_value = "ecdsa-sha256")]
        algorithms: Vec<SignatureAlgorithm>,

        /// Answer with a different key than the one being verified
        #[arg(long)]
        wrong_key: bool,
    },

    /// Show a persisted auth block state
    Inspect {
        /// State file written by `roundtrip --output`
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sigil_seal=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(SealConfig::default_path);
    let mut config = SealConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if cli.diagnostic {
        config.engine.diagnostic_mode = true;
    }

    match cli.command {
        Commands::Roundtrip {
            algorithms,
            derive_algorithms,
            user,
            locked,
            output,
        } => {
            let derive_algorithms = derive_algorithms.unwrap_or_else(|| algorithms.clone());
            roundtrip(&config, algorithms, derive_algorithms, user, locked, output).await?;
        }
        Commands::Verify {
            algorithms,
            wrong_key,
        } => verify(&config, algorithms, wrong_key).await?,
        Commands::Inspect { file } => inspect(&file)?,
        Commands::Config(ConfigCommands::Show) => {
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Config(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                );
            }
            SealConfig::default().save(&config_path)?;
            println!("Wrote default configuration to {}", config_path.display());
        }
    }

    Ok(())
}

fn spawn_engine(config: &SealConfig, backend: Arc<SoftwareSealingBackend>) -> EngineHandle {
    ChallengeCredentialsEngine::spawn(backend, config.engine.capabilities())
}

async fn roundtrip(
    config: &SealConfig,
    algorithms: Vec<SignatureAlgorithm>,
    derive_algorithms: Vec<SignatureAlgorithm>,
    user: String,
    locked: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let backend = Arc::new(SoftwareSealingBackend::new());
    let engine = spawn_engine(config, backend.clone());
    let block = ChallengeCredentialAuthBlock::new(
        engine.clone(),
        Arc::new(Argon2KeyDerivation::new(config.kdf)),
    );
    let signer = LocalKeyTransport::random()?;

    let mut input = AuthInput {
        account_id: "self-test".to_string(),
        obfuscated_username: user.clone(),
        locked_to_single_user: false,
        challenge_credential: Some(ChallengeCredentialInput {
            public_key_der: signer.public_key_der().to_vec(),
            algorithms,
        }),
    };

    let (state, created) = block.create(&input, signer.clone()).await?;
    println!("Created auth block");
    if let AuthBlockState::ChallengeCredential(state) = &state {
        if let Some(algorithm) = state.challenge_info.salt_signature_algorithm {
            println!("  Salt algorithm: {}", algorithm);
        }
        println!("  Sealed secret:  {} bytes", state.challenge_info.sealed_secret.len());
    }

    if locked {
        backend.extend_pcr(USER_PCR_INDEX, user.as_bytes())?;
        input.locked_to_single_user = true;
        info!("User PCR extended, deriving in locked state");
    }
    if let Some(credential) = input.challenge_credential.as_mut() {
        credential.algorithms = derive_algorithms;
    }

    let derived = block.derive(&input, &state, signer).await?;
    println!("Derived auth block");
    println!("  vkk key:        {}", fingerprint(&derived.vkk_key));
    println!("  chaps key:      {}", fingerprint(&derived.chaps_key));
    println!("  reset seed key: {}", fingerprint(&derived.reset_seed_key));

    if let Some(path) = output {
        std::fs::write(&path, state.to_json()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("State written to {}", path.display());
    }

    engine.shutdown().await;
    if derived != created {
        bail!("Derived key material does not match created key material");
    }
    println!("Round trip OK");
    Ok(())
}

async fn verify(
    config: &SealConfig,
    algorithms: Vec<SignatureAlgorithm>,
    wrong_key: bool,
) -> Result<()> {
    let engine = spawn_engine(config, Arc::new(SoftwareSealingBackend::new()));
    let signer = LocalKeyTransport::random()?;
    let responder = if wrong_key {
        LocalKeyTransport::random()?
    } else {
        signer.clone()
    };

    let valid = engine
        .verify_key(
            VerifyKeyRequest {
                account_id: "self-test".to_string(),
                public_key_info: PublicKeyInfo::new(signer.public_key_der().to_vec(), algorithms),
            },
            responder,
        )
        .await?;
    engine.shutdown().await;

    println!("Key valid: {}", valid);
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let state = AuthBlockState::from_json(&json)?;

    println!("Auth block: {}", state.kind());
    match &state {
        AuthBlockState::ChallengeCredential(state) => {
            let info = &state.challenge_info;
            println!("  Public key:     {}", fingerprint(&info.public_key_der));
            println!(
                "  Salt algorithm: {}",
                info.salt_signature_algorithm
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "(missing)".to_string())
            );
            println!("  Salt valid:     {}", info.validate().is_ok());
            println!("  KDF params:     {:?}", state.kdf_state.params);
        }
        AuthBlockState::Password(kdf) => {
            println!("  KDF params:     {:?}", kdf.params);
        }
    }
    Ok(())
}

/// Short non-reversible identifier for key material
fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(&sha256(bytes)[..8])
}
