//! # Evofield Metering
//!
//! Resource sampling and overload detection for the evofield control loop.
//!
//! ## Thresholds
//!
//! ```text
//! t' = clamp(0.7·t + 0.3·(load + margin), floor, ceiling)
//! ```
//!
//! | Axis   | Margin | Floor | Ceiling | Initial |
//! |--------|--------|-------|---------|---------|
//! | CPU    | 20     | 60    | 95      | 85      |
//! | Memory | 25     | 70    | 98      | 90      |
//!
//! ## Overload Trigger
//!
//! An overload fires at most once per debounce interval and at most
//! `max_overloads_per_minute` times per rolling minute.

pub mod monitor;

pub use monitor::{
    AdaptiveThreshold, LoadSample, LoadSource, MonitorConfig, ProcfsLoad, ResourceMonitor,
    ResourceSample, SawtoothLoad, ScriptedLoad, SourceError, ThresholdBounds,
};
