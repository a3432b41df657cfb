//! # Evofield Common
//!
//! Shared types, errors, time sources and admission control for the evofield
//! control loop.
//!
//! ## Core Types
//!
//! - [`FitnessMetrics`]: three sub-scores plus their aggregate
//! - [`Clock`]: injectable monotonic and wall-clock time
//!
//! ## Security
//!
//! - [`security::gate`]: admission gate and energy invariant
//! - [`security::policy`]: cooldown plus rolling-window throttling
//! - [`security::audit`]: audit logging
//!
//! ## Crypto
//!
//! - [`crypto::hash`]: BLAKE3 content hashes

pub mod clock;
pub mod crypto;
pub mod error;
pub mod security;
pub mod types;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use crypto::{ContentHash, ContentHasher};
pub use error::{EvofieldError, InvariantViolation, Result};
pub use security::{AdmissionGate, AuditLogger, SealedGate, SharedGate, Throttle, ThrottleRule};
pub use types::fitness::FitnessMetrics;

/// Evofield version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Length of every rolling rate window
pub const ROLLING_WINDOW_SECS: u64 = 60;

/// Default exclusive upper bound on total field energy
pub const ENERGY_UPPER_BOUND: f64 = 1000.0;

/// Magnitude bound on every coupling weight
pub const WEIGHT_BOUND: f64 = 0.1;
