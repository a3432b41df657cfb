//! Degradation policy: aggregate < 0.7·best, or trailing mean < 0.8·best
//!
//! Only the first condition warrants a rollback.

use evofield_common::FitnessMetrics;
use serde::{Deserialize, Serialize};

/// Outcome of a degradation check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Healthy,
    /// Trailing average sagged; no action
    Degraded,
    /// Current aggregate collapsed; roll back
    Rollback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationPolicy {
    /// Fraction of best below which the current aggregate triggers rollback
    pub rollback_ratio: f64,
    /// Fraction of best below which the trailing average counts as degraded
    pub trend_ratio: f64,
    /// Trailing window length, also the minimum history length
    pub window: usize,
}

impl Default for DegradationPolicy {
    fn default() -> Self {
        Self {
            rollback_ratio: 0.7,
            trend_ratio: 0.8,
            window: 10,
        }
    }
}

impl DegradationPolicy {
    pub fn new(rollback_ratio: f64, trend_ratio: f64, window: usize) -> Self {
        Self {
            rollback_ratio,
            trend_ratio,
            window,
        }
    }

    pub fn assess(&self, history: &[FitnessMetrics], current: f64, best: f64) -> Verdict {
        if history.len() < self.window || self.window == 0 {
            return Verdict::Healthy;
        }

        if current < best * self.rollback_ratio {
            return Verdict::Rollback;
        }

        let tail = &history[history.len() - self.window..];
        let trailing = tail.iter().map(|m| m.aggregate).sum::<f64>() / self.window as f64;
        if trailing < best * self.trend_ratio {
            Verdict::Degraded
        } else {
            Verdict::Healthy
        }
    }
}
