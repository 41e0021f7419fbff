//! Hardware readiness gate
//!
//! Sealing to a storage root key generated by a ROCA-vulnerable
//! implementation offers no protection: the key is factorable. The gate
//! refuses every operation on such hardware unless the injected capabilities
//! allow it (diagnostic and test images).

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use sigil_seal_core::{Error, Result};

use crate::backend::SealingBackend;

/// Policy switches injected into the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Operate even on ROCA-vulnerable hardware
    pub allow_vulnerable_hardware: bool,
}

impl Capabilities {
    /// Production posture
    pub fn production() -> Self {
        Self::default()
    }

    /// Diagnostic/test-image posture
    pub fn diagnostic() -> Self {
        Self {
            allow_vulnerable_hardware: true,
        }
    }
}

/// Memoized readiness verdict, scoped to one engine instance
#[derive(Debug)]
pub struct ReadinessGate {
    capabilities: Capabilities,
    roca_vulnerable: Option<bool>,
}

impl ReadinessGate {
    pub fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            roca_vulnerable: None,
        }
    }

    /// Cached verdict, if the backend has been queried
    pub fn cached_verdict(&self) -> Option<bool> {
        self.roca_vulnerable
    }

    /// Check that operations may proceed
    ///
    /// The backend is queried on first use only; a successful answer (either
    /// way) is kept for the lifetime of the gate. A failed query is not cached.
    pub fn check(&mut self, backend: &dyn SealingBackend) -> Result<()> {
        let vulnerable = match self.roca_vulnerable {
            Some(vulnerable) => vulnerable,
            None => {
                let vulnerable = backend.is_srk_roca_vulnerable().map_err(|e| {
                    error!("Failed to query storage root key status: {}", e);
                    Error::from(e)
                })?;
                info!(
                    "{} backend storage root key ROCA-vulnerable: {}",
                    backend.backend_type(),
                    vulnerable
                );
                if vulnerable && self.capabilities.allow_vulnerable_hardware {
                    warn!("Using a ROCA-vulnerable storage root key in diagnostic mode");
                }
                self.roca_vulnerable = Some(vulnerable);
                vulnerable
            }
        };

        if vulnerable && !self.capabilities.allow_vulnerable_hardware {
            return Err(Error::HardwareNotReady(
                "storage root key is ROCA-vulnerable; firmware update required".to_string(),
            ));
        }
        Ok(())
    }
}
