//! FitnessMetrics - controller fitness snapshot
//!
//! Three sub-scores, each ideal at 1.0:
//! - Compactness of the persisted artifacts
//! - Step performance against a target duration
//! - Energy efficiency against a target energy
//!
//! The aggregate is their arithmetic mean.

use serde::{Deserialize, Serialize};

/// Lowest value a clamped sub-score can take
pub const MIN_SUB_SCORE: f64 = 0.1;

/// Highest value any sub-score can take
pub const MAX_SUB_SCORE: f64 = 1.0;

/// Fitness snapshot for one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessMetrics {
    /// Artifact compactness score
    pub compactness: f64,

    /// Step performance score
    pub performance: f64,

    /// Energy efficiency score
    pub energy: f64,

    /// Arithmetic mean of the three sub-scores
    pub aggregate: f64,
}

impl FitnessMetrics {
    /// Build a snapshot from sub-scores, computing the aggregate
    pub fn from_scores(compactness: f64, performance: f64, energy: f64) -> Self {
        Self {
            compactness,
            performance,
            energy,
            aggregate: (compactness + performance + energy) / 3.0,
        }
    }

    /// Sub-scores in dump order
    #[inline]
    pub fn as_array(&self) -> [f64; 4] {
        [self.compactness, self.performance, self.energy, self.aggregate]
    }

    /// Rebuild from dump order without recomputing the aggregate
    #[inline]
    pub fn from_array(values: [f64; 4]) -> Self {
        Self {
            compactness: values[0],
            performance: values[1],
            energy: values[2],
            aggregate: values[3],
        }
    }
}
