//! Adaptive overload thresholds
//!
//! ```text
//! t' = clamp(0.7·t + 0.3·(load + margin), floor, ceiling)
//! ```
//!
//! All values are percentages.

use serde::{Deserialize, Serialize};

/// Weight kept from the previous threshold
const RETENTION: f64 = 0.7;

/// Per-axis threshold limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBounds {
    /// Headroom added to the observed load
    pub margin: f64,
    pub floor: f64,
    pub ceiling: f64,
}

impl ThresholdBounds {
    pub const CPU: Self = Self {
        margin: 20.0,
        floor: 60.0,
        ceiling: 95.0,
    };

    pub const MEMORY: Self = Self {
        margin: 25.0,
        floor: 70.0,
        ceiling: 98.0,
    };
}

/// Exponentially smoothed threshold for one resource axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThreshold {
    value: f64,
    bounds: ThresholdBounds,
}

impl AdaptiveThreshold {
    pub fn new(initial: f64, bounds: ThresholdBounds) -> Self {
        Self {
            value: initial,
            bounds,
        }
    }

    /// Current threshold
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn bounds(&self) -> ThresholdBounds {
        self.bounds
    }

    /// Fold a new load reading into the threshold
    pub fn adapt(&mut self, load: f64) -> f64 {
        let target = load + self.bounds.margin;
        self.value = (RETENTION * self.value + (1.0 - RETENTION) * target)
            .clamp(self.bounds.floor, self.bounds.ceiling);
        self.value
    }

    /// Whether `load` exceeds the threshold
    #[inline]
    pub fn exceeded_by(&self, load: f64) -> bool {
        load > self.value
    }
}
