//! Self-optimization
//!
//! Proposes parameter changes as plain data. Nothing here touches the field or
//! rewrites configuration; the runtime decides what to do with a proposal.

use evofield_common::FitnessMetrics;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Sub-score below which a parameter group is considered under pressure
pub const PRESSURE_THRESHOLD: f64 = 0.8;

/// Relative drop between consecutive evaluations that counts as a regression
pub const REGRESSION_TOLERANCE: f64 = 0.1;

/// Why a delta was proposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaReason {
    /// Step performance below target
    LowPerformance,
    /// Energy efficiency below target
    LowEnergyEfficiency,
    /// Aggregate low with no single sub-score to blame
    LowFitness,
    /// Periodic upkeep while in stasis
    StasisUpkeep,
}

/// Proposed parameter changes; `None` leaves a parameter as is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDelta {
    /// Evaluation count when proposed
    pub evaluation: u64,
    pub reasons: Vec<DeltaReason>,
    pub side: Option<usize>,
    pub dt: Option<f64>,
    pub mass: Option<f64>,
    pub coupling: Option<f64>,
    pub damping_factor: Option<f64>,
    pub phi_limit: Option<f64>,
    pub learning_rate: Option<f64>,
    pub weight_decay: Option<f64>,
}

impl ParameterDelta {
    /// Whether the delta changes anything
    pub fn is_empty(&self) -> bool {
        self.side.is_none()
            && self.dt.is_none()
            && self.mass.is_none()
            && self.coupling.is_none()
            && self.damping_factor.is_none()
            && self.phi_limit.is_none()
            && self.learning_rate.is_none()
            && self.weight_decay.is_none()
    }

    fn relax_performance(&mut self) {
        self.reasons.push(DeltaReason::LowPerformance);
        self.side = Some(16);
        self.dt = Some(0.002);
        self.learning_rate = Some(0.0005);
    }

    fn relax_energy(&mut self) {
        self.reasons.push(DeltaReason::LowEnergyEfficiency);
        self.mass = Some(0.8);
        self.coupling = Some(0.3);
        self.damping_factor = Some(0.995);
        self.phi_limit = Some(1.5);
        self.weight_decay = Some(0.998);
    }

    fn slow_learning(&mut self, reason: DeltaReason) {
        self.reasons.push(reason);
        self.learning_rate = Some(0.0005);
        self.weight_decay = Some(0.998);
    }
}

/// Derives [`ParameterDelta`]s from fitness
#[derive(Debug, Clone)]
pub struct SelfOptimizer {
    min_fitness: f64,
}

impl SelfOptimizer {
    pub fn new(min_fitness: f64) -> Self {
        Self { min_fitness }
    }

    pub fn min_fitness(&self) -> f64 {
        self.min_fitness
    }

    /// Whether an optimization pass is worth running
    pub fn should_optimize(&self, metrics: &FitnessMetrics) -> bool {
        metrics.aggregate <= self.min_fitness
    }

    /// Propose changes targeting the weakest sub-scores
    pub fn propose(&self, metrics: &FitnessMetrics, evaluation: u64) -> ParameterDelta {
        let mut delta = ParameterDelta {
            evaluation,
            ..ParameterDelta::default()
        };

        if metrics.performance < PRESSURE_THRESHOLD {
            delta.relax_performance();
        }
        if metrics.energy < PRESSURE_THRESHOLD {
            delta.relax_energy();
        }
        if delta.reasons.is_empty() {
            delta.slow_learning(DeltaReason::LowFitness);
        }

        info!(
            evaluation,
            reasons = ?delta.reasons,
            aggregate = metrics.aggregate,
            "Parameter delta proposed"
        );
        delta
    }

    /// Smallest useful change, issued periodically during stasis
    pub fn minimal(&self, evaluation: u64) -> ParameterDelta {
        let mut delta = ParameterDelta {
            evaluation,
            ..ParameterDelta::default()
        };
        delta.slow_learning(DeltaReason::StasisUpkeep);
        delta
    }

    /// Log which parameter groups are under pressure
    pub fn log_pressure(&self, metrics: &FitnessMetrics) {
        if metrics.performance < PRESSURE_THRESHOLD {
            warn!(score = metrics.performance, "Step performance below target");
        }
        if metrics.energy < PRESSURE_THRESHOLD {
            warn!(score = metrics.energy, "Energy efficiency below target");
        }
    }

    /// Compare the last two evaluations; false on a drop beyond tolerance
    pub fn validate_improvement(&self, history: &[FitnessMetrics]) -> bool {
        let [.., previous, latest] = history else {
            return true;
        };
        if previous.aggregate <= 0.0 {
            return true;
        }

        let drop = (previous.aggregate - latest.aggregate) / previous.aggregate;
        if drop > REGRESSION_TOLERANCE {
            warn!(
                previous = previous.aggregate,
                latest = latest.aggregate,
                drop,
                "Fitness regressed after optimization"
            );
            return false;
        }
        true
    }
}

impl Default for SelfOptimizer {
    fn default() -> Self {
        Self::new(0.8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_above_min_fitness() {
        let optimizer = SelfOptimizer::default();
        assert!(!optimizer.should_optimize(&FitnessMetrics::from_scores(0.9, 0.9, 0.9)));
        assert!(optimizer.should_optimize(&FitnessMetrics::from_scores(0.5, 0.9, 0.9)));
    }

    #[test]
    fn test_low_performance_delta() {
        let optimizer = SelfOptimizer::default();
        let delta = optimizer.propose(&FitnessMetrics::from_scores(1.0, 0.3, 1.0), 1000);

        assert_eq!(delta.reasons, vec![DeltaReason::LowPerformance]);
        assert_eq!(delta.side, Some(16));
        assert_eq!(delta.dt, Some(0.002));
        assert_eq!(delta.learning_rate, Some(0.0005));
        assert!(delta.mass.is_none());
        assert_eq!(delta.evaluation, 1000);
    }

    #[test]
    fn test_low_energy_delta() {
        let optimizer = SelfOptimizer::default();
        let delta = optimizer.propose(&FitnessMetrics::from_scores(1.0, 1.0, 0.2), 2000);

        assert_eq!(delta.reasons, vec![DeltaReason::LowEnergyEfficiency]);
        assert_eq!(delta.mass, Some(0.8));
        assert_eq!(delta.coupling, Some(0.3));
        assert_eq!(delta.damping_factor, Some(0.995));
        assert_eq!(delta.phi_limit, Some(1.5));
        assert_eq!(delta.weight_decay, Some(0.998));
        assert!(delta.side.is_none());
    }

    #[test]
    fn test_compactness_only_falls_back() {
        let optimizer = SelfOptimizer::default();
        let delta = optimizer.propose(&FitnessMetrics::from_scores(0.1, 1.0, 1.0), 1);
        assert_eq!(delta.reasons, vec![DeltaReason::LowFitness]);
        assert!(!delta.is_empty());
    }

    #[test]
    fn test_minimal_delta() {
        let delta = SelfOptimizer::default().minimal(4000);
        assert_eq!(delta.reasons, vec![DeltaReason::StasisUpkeep]);
        assert_eq!(delta.learning_rate, Some(0.0005));
        assert_eq!(delta.weight_decay, Some(0.998));
        assert!(delta.side.is_none());
    }

    #[test]
    fn test_validate_improvement() {
        let optimizer = SelfOptimizer::default();
        let m = |a: f64| FitnessMetrics {
            aggregate: a,
            ..FitnessMetrics::default()
        };

        assert!(optimizer.validate_improvement(&[]));
        assert!(optimizer.validate_improvement(&[m(0.5)]));
        assert!(optimizer.validate_improvement(&[m(0.5), m(0.46)]));
        assert!(!optimizer.validate_improvement(&[m(0.5), m(0.4)]));
        assert!(optimizer.validate_improvement(&[m(0.0), m(0.4)]));
    }

    #[test]
    fn test_delta_serializes_reasons() {
        let delta = SelfOptimizer::default().minimal(1);
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json["reasons"][0], "stasis_upkeep");
    }
}
