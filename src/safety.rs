//! Dew-point interlock.
//!
//! Condensation on a module under test is the failure this bench must never
//! cause.  The interlock compares every module temperature against the air
//! dew point of the same tick: a module colder than `dew_point + distance`
//! is at risk.
//!
//! ## Interlock lifecycle
//!
//! 1. [`DewPointInterlock::evaluate`] runs every control tick, before the
//!    target-reached test.
//! 2. On the first risky tick the engaged latch is set and logged; the ramp
//!    controller then holds the chamber at its measured temperature.
//! 3. The controller re-evaluates with fresh readings until the risk is gone
//!    (latch cleared and logged) or the interlock timeout expires.
//!
//! A `NaN` dew point (no air humidity, or RH = 0) never engages the
//! interlock, since every comparison against `NaN` is false.

use log::{error, info};

use crate::config::RunConfig;
use crate::sensors::ReadingSet;

/// Dew-point interlock state.
pub struct DewPointInterlock {
    module_locations: Vec<String>,
    /// Default margin (°C) the module temperatures must stay above the dew point.
    min_distance: f64,
    /// Latched: the last evaluation found a module at risk.
    engaged: bool,
}

impl DewPointInterlock {
    pub fn new(config: &RunConfig) -> Self {
        Self::with_modules(config.module_sensors.clone(), config.min_interlock_distance_c)
    }

    pub fn with_modules(module_locations: Vec<String>, min_distance: f64) -> Self {
        Self {
            module_locations,
            min_distance,
            engaged: false,
        }
    }

    /// True if any available module temperature is below
    /// `dew_point + distance`.  Pure; does not touch the latch.
    pub fn at_risk(&self, readings: &ReadingSet, distance: f64) -> bool {
        let dp = readings.dew_point;
        !dp.is_nan()
            && readings
                .temperatures_at(&self.module_locations)
                .any(|t| t < dp + distance)
    }

    /// Evaluate at the configured margin and update the engaged latch.
    /// Returns whether the interlock is engaged.
    pub fn evaluate(&mut self, readings: &ReadingSet) -> bool {
        self.evaluate_at(readings, self.min_distance)
    }

    /// Evaluate at an explicit margin and update the engaged latch.
    pub fn evaluate_at(&mut self, readings: &ReadingSet, distance: f64) -> bool {
        let risk = self.at_risk(readings, distance);
        if risk && !self.engaged {
            error!(
                "INTERLOCK ENGAGED: module temperature within {:.1}\u{00b0}C of dew point {:.2}\u{00b0}C",
                distance, readings.dew_point
            );
        } else if !risk && self.engaged {
            info!("INTERLOCK CLEARED: dew point {:.2}\u{00b0}C", readings.dew_point);
        }
        self.engaged = risk;
        risk
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn min_distance(&self) -> f64 {
        self.min_distance
    }

    /// Lowest available module temperature, for log messages.
    pub fn coldest_module(&self, readings: &ReadingSet) -> Option<f64> {
        readings
            .temperatures_at(&self.module_locations)
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.min(t))))
    }
}
