//! Sealing configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use sigil_seal_engine::EngineConfig;

use crate::error::Result;
use crate::kdf::KdfParams;

/// Environment variable overriding the configuration file location
pub const CONFIG_ENV_VAR: &str = "SIGIL_SEAL_CONFIG";

/// Sealing configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealConfig {
    /// Engine policy
    #[serde(default)]
    pub engine: EngineConfig,

    /// Argon2id costs for new key derivations
    #[serde(default)]
    pub kdf: KdfParams,
}

impl SealConfig {
    /// Configuration file location
    ///
    /// `$SIGIL_SEAL_CONFIG` if set, otherwise `sigil-seal/config.json` in the
    /// platform configuration directory.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sigil-seal")
            .join("config.json")
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
