//! # Evofield Darwinian
//!
//! Evolution controller for the field lattice.
//!
//! ## Fitness Formula
//!
//! ```text
//! compactness = clamp(1 - size/500000, 0.1, 1.0)
//! performance = 1.0 if d <= t* else (t*/d)^0.5
//! energy      = 1.0 if E <= E* else (E*/E)^0.3
//! aggregate   = (compactness + performance + energy) / 3
//! ```
//!
//! ## Rollback Policy
//!
//! Every 500 evaluations: an aggregate below 0.7 × best rolls the field back to
//! the latest checkpoint. A trailing-10 mean below 0.8 × best is only reported.

pub mod checkpoint;
pub mod controller;
pub mod degradation;
pub mod dump;
pub mod fitness;
pub mod telemetry;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use checkpoint::{
    Checkpoint, CheckpointError, CheckpointStore, FsCheckpointStore, MemoryCheckpointStore,
    RetentionPolicy,
};
pub use controller::{
    ControllerStats, DeltaReason, EvolutionController, EvolutionPhase, MutationOutcome,
    ParameterDelta,
};
pub use degradation::{DegradationPolicy, Verdict};
pub use dump::{DumpRecord, EvolutionReport};
pub use fitness::{ArtifactProbe, DirectoryProbe, FitnessCalculator, FitnessTargets, FixedProbe};
pub use telemetry::Telemetry;

/// Evolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Minimum seconds between two applied mutations
    pub reduction_cooldown_seconds: u64,
    /// Applied mutations allowed per rolling minute
    pub max_reductions_per_minute: u32,
    /// Aggregate at or below which self-optimization runs
    pub min_fitness_for_optimization: f64,
    /// Ticks between runtime evolution checks
    pub evolution_interval_steps: u64,
    /// Coupling mutation strength while Active
    pub mutation_strength: f64,
    /// Minimal mutation strength in stasis
    pub stasis_mutation_strength: f64,
    /// Evaluations between degradation checks
    pub degradation_check_interval: u64,
    /// Evaluations between self-optimization passes
    pub optimization_interval: u64,
    /// Evaluations between stasis upkeep proposals
    pub stasis_upkeep_interval: u64,
    /// Optional cap on retained history; `None` keeps every evaluation
    pub history_limit: Option<usize>,
    /// State report written on stasis entry
    pub state_report_path: Option<PathBuf>,
    pub targets: FitnessTargets,
    pub degradation: DegradationPolicy,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            reduction_cooldown_seconds: 30,
            max_reductions_per_minute: 2,
            min_fitness_for_optimization: 0.8,
            evolution_interval_steps: 1000,
            mutation_strength: 0.05,
            stasis_mutation_strength: 0.001,
            degradation_check_interval: 500,
            optimization_interval: 1000,
            stasis_upkeep_interval: 2000,
            history_limit: None,
            state_report_path: None,
            targets: FitnessTargets::default(),
            degradation: DegradationPolicy::default(),
        }
    }
}
