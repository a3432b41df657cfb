//! Fitness scoring
//!
//! - FitnessCalculator: sub-scores and aggregate
//! - ArtifactProbe: external artifact size signal

pub mod calculator;
pub mod probe;

pub use calculator::{FitnessCalculator, FitnessTargets};
pub use probe::{ArtifactProbe, DirectoryProbe, FixedProbe};
