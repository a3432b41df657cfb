//! Dynamics collaborator: momentum damping and phase-space clamps
//!
//! Runs after every integrator step. Damping and clamping are switched
//! independently; with clamps disabled the cubic potential may drive the
//! field to diverge.

use serde::{Deserialize, Serialize};

use crate::field::FieldState;

/// Dynamics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicsConfig {
    pub enabled: bool,
    pub damping_enabled: bool,
    /// Multiplier applied to every momentum
    pub damping_factor: f64,
    pub limits_enabled: bool,
    pub min_phi: f64,
    pub max_phi: f64,
    pub min_pi: f64,
    pub max_pi: f64,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            damping_enabled: true,
            damping_factor: 0.999,
            limits_enabled: true,
            min_phi: -2.0,
            max_phi: 2.0,
            min_pi: -10.0,
            max_pi: 10.0,
        }
    }
}

/// Applies damping and clamps to the field in place
#[derive(Debug, Clone, Default)]
pub struct Dynamics {
    config: DynamicsConfig,
}

impl Dynamics {
    pub fn new(config: DynamicsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DynamicsConfig {
        &self.config
    }

    pub fn apply(&self, field: &mut FieldState) {
        if !self.config.enabled {
            return;
        }
        let cfg = &self.config;
        let (phi, pi) = field.phase_space_mut();

        if cfg.damping_enabled {
            for p in pi.iter_mut() {
                *p *= cfg.damping_factor;
            }
        }

        // Manual comparisons so a NaN passes through unchanged.
        if cfg.limits_enabled {
            for x in phi.iter_mut() {
                *x = bound(*x, cfg.min_phi, cfg.max_phi);
            }
            for p in pi.iter_mut() {
                *p = bound(*p, cfg.min_pi, cfg.max_pi);
            }
        }
    }
}

#[inline]
fn bound(value: f64, min: f64, max: f64) -> f64 {
    if value > max {
        max
    } else if value < min {
        min
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::SimulationParameters;

    fn reference_params() -> SimulationParameters {
        SimulationParameters {
            side: 4,
            dt: 0.001,
            mass: 1.0,
            coupling: 0.5,
        }
    }

    fn seeded_field() -> FieldState {
        let mut field = FieldState::new(reference_params()).unwrap();
        field.initialize(42, 0.1, 0.02).unwrap();
        field
    }

    #[test]
    fn test_damping_scales_momenta() {
        let mut field = seeded_field();
        field.pi_mut().fill(1.0);

        Dynamics::default().apply(&mut field);

        assert!(field.pi().iter().all(|p| (*p - 0.999).abs() < 1e-12));
    }

    #[test]
    fn test_clamps_bound_phase_space() {
        let mut field = seeded_field();
        field.phi_mut()[0] = 5.0;
        field.phi_mut()[1] = -3.0;
        field.pi_mut()[2] = 50.0;

        let dynamics = Dynamics::new(DynamicsConfig {
            damping_enabled: false,
            ..DynamicsConfig::default()
        });
        dynamics.apply(&mut field);

        assert_eq!(field.phi()[0], 2.0);
        assert_eq!(field.phi()[1], -2.0);
        assert_eq!(field.pi()[2], 10.0);
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut field = seeded_field();
        field.phi_mut()[0] = 5.0;
        let before = field.snapshot();

        Dynamics::new(DynamicsConfig {
            enabled: false,
            ..DynamicsConfig::default()
        })
        .apply(&mut field);

        assert_eq!(field.snapshot(), before);
    }

    #[test]
    fn test_clamped_run_stays_bounded() {
        let mut field = seeded_field();
        let dynamics = Dynamics::default();

        for _ in 0..1000 {
            field.step();
            dynamics.apply(&mut field);
        }

        assert!(field.phi().iter().all(|p| p.is_finite() && p.abs() <= 2.0));
        assert!(field.pi().iter().all(|p| p.is_finite() && p.abs() <= 10.0));
        assert!(field.total_energy().is_finite());
    }

    #[test]
    fn test_unclamped_run_is_permitted() {
        // Divergence is allowed here; the run only has to complete.
        let mut field = seeded_field();
        field.phi_mut().fill(-40.0);
        let dynamics = Dynamics::new(DynamicsConfig {
            limits_enabled: false,
            ..DynamicsConfig::default()
        });

        for _ in 0..1000 {
            field.step();
            dynamics.apply(&mut field);
        }

        assert_eq!(field.node_count(), 16);
    }
}
