//! Throttling policy enforcement
//!
//! Cooldown plus rolling-window caps shared by the mutation rate limiter and the
//! overload debouncer:
//! - Minimum interval between two recorded events
//! - Maximum events per window
//! - Window restarts once its length has elapsed since its own start

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Reason an event was throttled
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThrottleDenial {
    #[error("Cooldown active: {remaining:?} remaining")]
    Cooldown { remaining: Duration },

    #[error("Window cap reached: {count} of {max} events")]
    WindowCap { count: u32, max: u32 },
}

/// Throttle rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleRule {
    /// Rule name, used in logs
    pub name: String,
    /// Minimum time between two recorded events
    pub min_interval: Duration,
    /// Maximum events inside one window
    pub max_events: u32,
    /// Window length
    pub window: Duration,
}

impl ThrottleRule {
    /// Rule with the standard one-minute window
    pub fn per_minute(name: &str, min_interval: Duration, max_events: u32) -> Self {
        Self {
            name: name.to_string(),
            min_interval,
            max_events,
            window: Duration::from_secs(crate::ROLLING_WINDOW_SECS),
        }
    }
}

/// Rolling window state
#[derive(Debug, Clone, Default)]
struct ThrottleState {
    count: u32,
    window_start: Option<Duration>,
    last_event: Option<Duration>,
}

/// Cooldown and rolling-window limiter over caller-supplied timestamps
#[derive(Debug, Clone)]
pub struct Throttle {
    rule: ThrottleRule,
    state: ThrottleState,
}

impl Throttle {
    /// Create a new throttle
    pub fn new(rule: ThrottleRule) -> Self {
        Self {
            rule,
            state: ThrottleState::default(),
        }
    }

    /// Check whether an event at `now` would be admitted
    ///
    /// Rolls the window over when it has expired, even if the cooldown is
    /// still running. Does not record anything.
    pub fn check(&mut self, now: Duration) -> Result<(), ThrottleDenial> {
        self.roll_window(now);

        if let Some(last) = self.state.last_event {
            let since = now.saturating_sub(last);
            if since < self.rule.min_interval {
                return Err(ThrottleDenial::Cooldown {
                    remaining: self.rule.min_interval - since,
                });
            }
        }

        if self.state.count >= self.rule.max_events {
            return Err(ThrottleDenial::WindowCap {
                count: self.state.count,
                max: self.rule.max_events,
            });
        }

        Ok(())
    }

    /// Record an admitted event at `now`
    pub fn record(&mut self, now: Duration) {
        self.roll_window(now);
        if self.state.window_start.is_none() {
            self.state.window_start = Some(now);
        }
        self.state.count += 1;
        self.state.last_event = Some(now);

        debug!(
            rule = %self.rule.name,
            count = self.state.count,
            max = self.rule.max_events,
            "Throttled event recorded"
        );
    }

    /// Check and record in one call
    pub fn try_acquire(&mut self, now: Duration) -> Result<(), ThrottleDenial> {
        self.check(now)?;
        self.record(now);
        Ok(())
    }

    /// Events recorded in the current window
    pub fn count_in_window(&self) -> u32 {
        self.state.count
    }

    /// Timestamp of the last recorded event
    pub fn last_event(&self) -> Option<Duration> {
        self.state.last_event
    }

    /// Get the rule
    pub fn rule(&self) -> &ThrottleRule {
        &self.rule
    }

    /// Forget all recorded events
    pub fn reset(&mut self) {
        self.state = ThrottleState::default();
    }

    fn roll_window(&mut self, now: Duration) {
        if let Some(start) = self.state.window_start {
            if now.saturating_sub(start) >= self.rule.window {
                self.state.count = 0;
                self.state.window_start = None;
            }
        }
    }
}
