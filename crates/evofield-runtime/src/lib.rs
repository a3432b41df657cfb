//! # Evofield Runtime
//!
//! Wires the lattice, the resource monitor, the admission gate and the
//! evolution controller into a single-threaded tick loop.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Simulation                       │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────┐  │
//! │  │  Resource    │  │  Admission   │  │ Telemetry  │  │
//! │  │  Monitor     │  │  Gate        │  │            │  │
//! │  └──────┬───────┘  └──────┬───────┘  └─────┬──────┘  │
//! │         │                 │                │         │
//! │  ┌──────┴─────────────────┴────────────────┴──────┐  │
//! │  │              EvolutionController               │  │
//! │  │  (fitness, rate limit, stasis, checkpoints)    │  │
//! │  └──────────────────────┬─────────────────────────┘  │
//! │                         │                            │
//! │  ┌──────────────────────┴─────────────────────────┐  │
//! │  │     FieldState + Dynamics + Learning           │  │
//! │  └────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod simulation;

pub use config::{CheckpointSettings, LoadSourceKind, RuntimeSettings, SimulationSettings, SystemConfig};
pub use simulation::{RunSummary, Simulation, SimulationBuilder, TickReport};

/// Runtime version
pub const RUNTIME_VERSION: &str = env!("CARGO_PKG_VERSION");
