//! Learning collaborator: local plasticity over the coupling matrix
//!
//! ```text
//! Hebbian: W_ij = W_ij·decay + η·phi_i·phi_j
//! Oja:     W_ij = W_ij·decay + η·(phi_i·phi_j − phi_i²·W_ij)
//! ```
//!
//! Both rules walk the upper triangle, clamp to the weight bounds and mirror,
//! so the matrix stays symmetric with a zero diagonal.

use serde::{Deserialize, Serialize};

use evofield_common::WEIGHT_BOUND;

use crate::field::FieldState;

/// Plasticity rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningRule {
    Hebbian,
    Oja,
}

impl std::str::FromStr for LearningRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hebbian" => Ok(Self::Hebbian),
            "oja" => Ok(Self::Oja),
            other => Err(format!("unknown learning rule: {other}")),
        }
    }
}

/// Learning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    pub enabled: bool,
    pub rule: LearningRule,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rule: LearningRule::Hebbian,
            learning_rate: 0.001,
            weight_decay: 0.999,
            min_weight: -WEIGHT_BOUND,
            max_weight: WEIGHT_BOUND,
        }
    }
}

/// Applies the configured rule to the field's couplings
#[derive(Debug, Clone, Default)]
pub struct Learning {
    config: LearningConfig,
}

impl Learning {
    pub fn new(config: LearningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn apply(&self, field: &mut FieldState) {
        if !self.config.enabled {
            return;
        }
        let cfg = &self.config;
        let n = field.node_count();
        let (phi, weights) = field.couplings_mut();

        for i in 0..n {
            for j in (i + 1)..n {
                let w = weights[i * n + j];
                let update = match cfg.rule {
                    LearningRule::Hebbian => cfg.learning_rate * phi[i] * phi[j],
                    LearningRule::Oja => {
                        cfg.learning_rate * (phi[i] * phi[j] - phi[i] * phi[i] * w)
                    }
                };
                let next = (w * cfg.weight_decay + update).clamp(cfg.min_weight, cfg.max_weight);
                weights[i * n + j] = next;
                weights[j * n + i] = next;
            }
        }
    }
}
