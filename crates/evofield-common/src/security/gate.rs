//! Admission gate
//!
//! The single authority consulted before any state-altering mutation. It also
//! validates the bounded-energy invariant of the field. Every request and every
//! decision goes through the [`AuditLogger`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::audit::AuditLogger;
use crate::error::InvariantViolation;

/// Controller-issued weight mutation
pub const ACTION_SYSTEM_MUTATION: &str = "system_mutation";
/// Overload-driven complexity reduction
pub const ACTION_REDUCE_COMPLEXITY: &str = "reduce_complexity";

/// Admission capability injected into the controller and the runtime
pub trait AdmissionGate: Send + Sync {
    /// Ask whether `action` may proceed. A denial is final for the caller.
    fn request_permission(&self, action: &str) -> bool;

    /// Check that the total energy lies in `[0, upper_bound)`
    fn validate_energy(&self, energy: f64) -> Result<(), InvariantViolation>;
}

/// Shared gate handle
pub type SharedGate = Arc<dyn AdmissionGate>;

/// Gate constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Exclusive upper bound on total energy
    pub energy_upper_bound: f64,
    /// Energy below which the field counts as at rest
    pub minimal_energy_threshold: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            energy_upper_bound: crate::ENERGY_UPPER_BOUND,
            minimal_energy_threshold: 0.0001,
        }
    }
}

/// Reference gate: grants every request, audits every decision
///
/// Denial is never produced here; callers still handle it because other gate
/// implementations may deny.
pub struct SealedGate {
    config: GateConfig,
    audit: AuditLogger,
}

impl SealedGate {
    /// Create a new gate
    pub fn new(config: GateConfig, audit: AuditLogger) -> Self {
        debug!(upper_bound = config.energy_upper_bound, "Admission gate sealed");
        Self { config, audit }
    }

    /// Get gate constants
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Whether the field is effectively at rest
    pub fn is_at_rest(&self, energy: f64) -> bool {
        energy.abs() < self.config.minimal_energy_threshold
    }
}

impl Default for SealedGate {
    fn default() -> Self {
        Self::new(GateConfig::default(), AuditLogger::new())
    }
}

impl AdmissionGate for SealedGate {
    fn request_permission(&self, action: &str) -> bool {
        debug!(action, "Permission requested");
        self.audit.log_admission("admission_gate", action, true);
        true
    }

    fn validate_energy(&self, energy: f64) -> Result<(), InvariantViolation> {
        let result = if !energy.is_finite() {
            Err(InvariantViolation::NonFiniteEnergy)
        } else if energy < 0.0 {
            Err(InvariantViolation::NegativeEnergy { energy })
        } else if energy >= self.config.energy_upper_bound {
            Err(InvariantViolation::EnergyCeiling {
                energy,
                upper_bound: self.config.energy_upper_bound,
            })
        } else {
            Ok(())
        };

        match &result {
            Ok(()) => self.audit.log_invariant_check("admission_gate", energy, None),
            Err(violation) => {
                warn!(energy, %violation, "Energy invariant violated");
                self.audit
                    .log_invariant_check("admission_gate", energy, Some(&violation.to_string()));
            }
        }

        result
    }
}
