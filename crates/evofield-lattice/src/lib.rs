//! # Evofield Lattice
//!
//! Coupled scalar-field lattice under symplectic-Euler integration.
//!
//! - [`field`]: state, integrator, energy, structured mutations
//! - [`dynamics`]: momentum damping and phase-space clamps
//! - [`learning`]: Hebbian and Oja coupling plasticity

pub mod dynamics;
pub mod field;
pub mod learning;

pub use dynamics::{Dynamics, DynamicsConfig};
pub use field::{FieldError, FieldSnapshot, FieldState, MutationKind, SimulationParameters};
pub use learning::{Learning, LearningConfig, LearningRule};
