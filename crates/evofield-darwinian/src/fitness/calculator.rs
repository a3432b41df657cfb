//! Fitness calculation: aggregate = (compactness + performance + energy) / 3

use std::time::Duration;

use evofield_common::types::fitness::{MAX_SUB_SCORE, MIN_SUB_SCORE};
use evofield_common::FitnessMetrics;
use serde::{Deserialize, Serialize};

/// Score used when the artifact size is unknown
pub const UNKNOWN_SIZE_SCORE: f64 = 0.5;

/// Reference points for the three sub-scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessTargets {
    /// Artifact size (bytes) at which compactness reaches its floor
    pub size_budget: f64,
    /// Step duration (seconds) at or below which performance is perfect
    pub target_time: f64,
    /// Energy at or below which efficiency is perfect
    pub target_energy: f64,
}

impl Default for FitnessTargets {
    fn default() -> Self {
        Self {
            size_budget: 500_000.0,
            target_time: 0.001,
            target_energy: 0.001,
        }
    }
}

pub struct FitnessCalculator {
    targets: FitnessTargets,
}

impl FitnessCalculator {
    pub fn new(targets: FitnessTargets) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &FitnessTargets {
        &self.targets
    }

    /// `clamp(1 - size/budget, 0.1, 1.0)`, or 0.5 when the size is unknown
    pub fn compactness(&self, artifact_size: Option<u64>) -> f64 {
        match artifact_size {
            Some(size) => (1.0 - size as f64 / self.targets.size_budget)
                .clamp(MIN_SUB_SCORE, MAX_SUB_SCORE),
            None => UNKNOWN_SIZE_SCORE,
        }
    }

    /// `1.0` up to the target time, then `(target/d)^0.5`
    pub fn performance(&self, step_duration: Duration) -> f64 {
        let d = step_duration.as_secs_f64();
        if d <= self.targets.target_time {
            return MAX_SUB_SCORE;
        }
        (self.targets.target_time / d).powf(0.5)
    }

    /// `1.0` up to the target energy, then `(target/E)^0.3`
    pub fn energy(&self, energy: f64) -> f64 {
        if energy.is_nan() {
            return MIN_SUB_SCORE;
        }
        if energy <= self.targets.target_energy {
            return MAX_SUB_SCORE;
        }
        (self.targets.target_energy / energy).powf(0.3)
    }

    /// Score one evaluation
    pub fn calculate(
        &self,
        artifact_size: Option<u64>,
        step_duration: Duration,
        energy: f64,
    ) -> FitnessMetrics {
        FitnessMetrics::from_scores(
            self.compactness(artifact_size),
            self.performance(step_duration),
            self.energy(energy),
        )
    }
}

impl Default for FitnessCalculator {
    fn default() -> Self {
        Self::new(FitnessTargets::default())
    }
}
