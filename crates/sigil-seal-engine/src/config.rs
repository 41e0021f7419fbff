//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::readiness::Capabilities;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Diagnostic/test-image posture: operate on ROCA-vulnerable hardware
    #[serde(default)]
    pub diagnostic_mode: bool,
}

impl EngineConfig {
    /// Capabilities injected into the readiness gate
    pub fn capabilities(&self) -> Capabilities {
        if self.diagnostic_mode {
            Capabilities::diagnostic()
        } else {
            Capabilities::production()
        }
    }
}
