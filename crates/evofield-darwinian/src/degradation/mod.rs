//! Degradation detection
pub mod policy;

pub use self::policy::{DegradationPolicy, Verdict};
