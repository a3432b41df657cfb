//! Evolution control
//!
//! - [`EvolutionController`]: fitness, mutations, stasis, rollback
//! - [`SelfOptimizer`]: parameter proposals derived from fitness

pub mod evolution;
pub mod optimizer;

pub use self::evolution::{ControllerStats, EvolutionController, EvolutionPhase, MutationOutcome};
pub use self::optimizer::{DeltaReason, ParameterDelta, SelfOptimizer};
