//! Resource monitor
//!
//! Samples load at a bounded rate, adapts per-axis thresholds and exposes a
//! debounced overload trigger:
//! - LoadSource: pluggable origin of readings
//! - AdaptiveThreshold: smoothed per-axis limit
//! - ResourceMonitor: sampling, overload detection, performance factor

pub mod source;
pub mod threshold;

pub use source::{LoadSample, LoadSource, ProcfsLoad, SawtoothLoad, ScriptedLoad, SourceError};
pub use threshold::{AdaptiveThreshold, ThresholdBounds};

use std::time::Duration;

use evofield_common::{Clock, SharedClock, Throttle, ThrottleRule};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Initial CPU threshold (percent)
    pub cpu_threshold: f64,
    /// Initial memory threshold (percent)
    pub memory_threshold: f64,
    /// Minimum time between two overload triggers
    pub overload_debounce_seconds: u64,
    /// Trigger cap per rolling minute
    pub max_overloads_per_minute: u32,
    /// Adapt thresholds on every sample
    pub adaptive_thresholds: bool,
    /// Minimum time between two samples (milliseconds)
    pub sample_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 85.0,
            memory_threshold: 90.0,
            overload_debounce_seconds: 5,
            max_overloads_per_minute: 2,
            adaptive_thresholds: true,
            sample_interval_ms: 1000,
        }
    }
}

/// Point-in-time view of the monitor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    /// CPU load (percent)
    pub cpu_load: f64,
    /// Memory load (percent)
    pub memory_load: f64,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    /// Overload triggers in the current window
    pub overloads_in_window: u32,
    pub performance_factor: f64,
}

/// Resource monitor
pub struct ResourceMonitor {
    config: MonitorConfig,
    source: Box<dyn LoadSource>,
    clock: SharedClock,
    cpu_load: f64,
    memory_load: f64,
    cpu_threshold: AdaptiveThreshold,
    memory_threshold: AdaptiveThreshold,
    last_sample: Duration,
    samples_taken: u64,
    overloads: Throttle,
    performance_factor: f64,
}

impl ResourceMonitor {
    /// Create a new monitor; the first sample is taken one interval from now
    pub fn new(config: MonitorConfig, source: Box<dyn LoadSource>, clock: SharedClock) -> Self {
        let overloads = Throttle::new(ThrottleRule::per_minute(
            "overload_debounce",
            Duration::from_secs(config.overload_debounce_seconds),
            config.max_overloads_per_minute,
        ));
        let last_sample = clock.elapsed();

        info!(
            source = source.name(),
            cpu_threshold = config.cpu_threshold,
            memory_threshold = config.memory_threshold,
            "Resource monitor initialized"
        );

        Self {
            cpu_threshold: AdaptiveThreshold::new(config.cpu_threshold, ThresholdBounds::CPU),
            memory_threshold: AdaptiveThreshold::new(
                config.memory_threshold,
                ThresholdBounds::MEMORY,
            ),
            config,
            source,
            clock,
            cpu_load: 0.0,
            memory_load: 0.0,
            last_sample,
            samples_taken: 0,
            overloads,
            performance_factor: 1.0,
        }
    }

    /// Take a sample if the sampling interval has elapsed
    ///
    /// Returns whether a new reading was folded in. A failing source keeps the
    /// previous readings.
    pub fn update(&mut self) -> bool {
        let now = self.clock.elapsed();
        if now.saturating_sub(self.last_sample) < Duration::from_millis(self.config.sample_interval_ms)
        {
            return false;
        }
        self.last_sample = now;

        let sample = match self.source.sample() {
            Ok(sample) => sample,
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Load sample failed");
                return false;
            }
        };

        self.cpu_load = sample.cpu * 100.0;
        self.memory_load = sample.memory * 100.0;
        self.samples_taken += 1;

        if self.config.adaptive_thresholds {
            self.cpu_threshold.adapt(self.cpu_load);
            self.memory_threshold.adapt(self.memory_load);
        }

        if self.samples_taken % 10 == 1 {
            debug!(
                cpu = self.cpu_load,
                memory = self.memory_load,
                cpu_threshold = self.cpu_threshold.value(),
                memory_threshold = self.memory_threshold.value(),
                "Resource sample"
            );
        }
        true
    }

    /// Load exceeds its threshold on either axis
    pub fn is_overloaded(&self) -> bool {
        self.cpu_threshold.exceeded_by(self.cpu_load)
            || self.memory_threshold.exceeded_by(self.memory_load)
    }

    /// Debounced overload edge
    ///
    /// True only when overloaded, the debounce interval has passed since the
    /// previous trigger and the per-minute cap is not yet reached.
    #[instrument(skip(self), level = "debug")]
    pub fn check_and_trigger_overload(&mut self) -> bool {
        let now = self.clock.elapsed();
        if let Err(denial) = self.overloads.check(now) {
            debug!(%denial, "Overload check suppressed");
            return false;
        }

        if !self.is_overloaded() {
            return false;
        }

        self.overloads.record(now);
        info!(
            cpu = self.cpu_load,
            memory = self.memory_load,
            triggers = self.overloads.count_in_window(),
            "Overload triggered"
        );
        true
    }

    /// Recompute the performance factor from CPU load
    pub fn adjust_performance(&mut self) -> f64 {
        let threshold = self.cpu_threshold.value();
        self.performance_factor = if self.cpu_load > threshold * 1.1 {
            0.7
        } else if self.cpu_load > threshold {
            0.9
        } else {
            1.0
        };
        self.performance_factor
    }

    pub fn performance_factor(&self) -> f64 {
        self.performance_factor
    }

    /// CPU load (percent)
    pub fn current_load(&self) -> f64 {
        self.cpu_load
    }

    /// Memory load (percent)
    pub fn memory_usage(&self) -> f64 {
        self.memory_load
    }

    pub fn cpu_threshold(&self) -> f64 {
        self.cpu_threshold.value()
    }

    pub fn memory_threshold(&self) -> f64 {
        self.memory_threshold.value()
    }

    pub fn samples_taken(&self) -> u64 {
        self.samples_taken
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Snapshot of the current readings
    pub fn sample(&self) -> ResourceSample {
        ResourceSample {
            cpu_load: self.cpu_load,
            memory_load: self.memory_load,
            cpu_threshold: self.cpu_threshold.value(),
            memory_threshold: self.memory_threshold.value(),
            overloads_in_window: self.overloads.count_in_window(),
            performance_factor: self.performance_factor,
        }
    }
}
