//! Run configuration.
//!
//! All tunable parameters of a thermal-cycling run.  Loaded from a JSON file
//! through [`ConfigPort`](crate::app::ports::ConfigPort); every field has a
//! default so a partial file only overrides what it names.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::sim::SimConfig;
use crate::app::plan::CyclePlan;
use crate::app::ports::ConfigError;
use crate::control::ramp::RampSettings;
use crate::sensors::{SensorDescriptor, default_sensor_table};

/// Which bench the runner talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    /// In-process chamber/hygrometer model on a virtual clock.
    Simulated(SimConfig),
    /// Weiss LabEvent chamber over TCP.  No hygrometer driver is attached,
    /// so the reference sensor must be `t_chamber` and the interlock off;
    /// the runner refuses to start otherwise.
    Weiss {
        address: String,
        #[serde(default = "default_weiss_port")]
        port: u16,
        #[serde(default = "default_weiss_device_id")]
        device_id: u8,
    },
}

fn default_weiss_port() -> u16 {
    2049
}

fn default_weiss_device_id() -> u8 {
    1
}

impl Default for Backend {
    fn default() -> Self {
        Self::Simulated(SimConfig::default())
    }
}

/// Core run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    // --- Plan ---
    pub cycles: CyclePlan,

    // --- Startup (drying phase) ---
    /// Temperature the chamber settles at before cycling (°C)
    pub starting_temperature_c: f64,
    /// Dew point the air must be below before cycling (°C)
    pub starting_dew_point_c: f64,
    /// Minimum time at the starting temperature (seconds)
    pub minimal_starting_secs: u64,
    /// Upper bound on the whole startup phase (seconds)
    pub maximal_starting_secs: u64,
    /// Record readings during the startup phase
    pub save_data_on_startup: bool,

    // --- Ramping ---
    /// Setpoint offset while heating (°C, applied until the window is entered)
    pub heat_overshoot_c: f64,
    /// Setpoint offset while cooling (°C)
    pub cool_overshoot_c: f64,
    /// Half-width of the convergence window (°C)
    pub accuracy_c: f64,
    /// Give up on a ramp after this long (seconds)
    pub ramp_timeout_secs: u64,
    /// Delay between two polls of the bench (milliseconds)
    pub poll_interval_ms: u64,

    // --- Interlock ---
    /// Sensor that must reach the target temperature
    pub reference_sensor: String,
    /// Locations whose temperature/humidity define the air dew point
    pub air_sensors: Vec<String>,
    /// Locations of probes mounted on modules under test
    pub module_sensors: Vec<String>,
    /// Module temperatures must stay this far above the dew point (°C)
    pub min_interlock_distance_c: f64,
    /// Give up holding for the dew point after this long (seconds)
    pub interlock_timeout_secs: u64,
    pub interlock_enabled: bool,

    // --- Shutdown ---
    /// Setpoint commanded on completion, error or interrupt (°C)
    pub safe_temperature_c: f64,

    // --- Bench ---
    pub sensors: Vec<SensorDescriptor>,
    pub backend: Backend,

    // --- Output ---
    pub output_dir: PathBuf,
    pub notify: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cycles: CyclePlan::default(),

            starting_temperature_c: 20.0,
            starting_dew_point_c: -25.0,
            minimal_starting_secs: 60 * 60,     // 1 h
            maximal_starting_secs: 3 * 60 * 60, // 3 h
            save_data_on_startup: true,

            heat_overshoot_c: 5.0,
            cool_overshoot_c: -10.0,
            accuracy_c: 1.0,
            ramp_timeout_secs: 60 * 60,
            poll_interval_ms: 1000,

            reference_sensor: "t_mod2".into(),
            air_sensors: vec!["air2".into(), "sens".into(), "chamber".into()],
            module_sensors: vec!["mod".into(), "mod2".into()],
            min_interlock_distance_c: 5.0,
            interlock_timeout_secs: 60 * 60,
            interlock_enabled: true,

            safe_temperature_c: 20.0,

            sensors: default_sensor_table(),
            backend: Backend::default(),

            output_dir: PathBuf::from("output_data"),
            notify: false,
        }
    }
}

impl RunConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ramp_timeout(&self) -> Duration {
        Duration::from_secs(self.ramp_timeout_secs)
    }

    /// Time allowed for the dew point to drop once the minimal startup
    /// dwell is over.
    pub fn startup_dew_point_timeout(&self) -> Duration {
        Duration::from_secs(
            self.maximal_starting_secs
                .saturating_sub(self.minimal_starting_secs),
        )
    }

    /// Margin the startup phase demands between the starting temperature
    /// and the air dew point.
    pub fn startup_dew_point_distance(&self) -> f64 {
        self.starting_temperature_c - self.starting_dew_point_c
    }

    /// Controller settings derived from this configuration.
    pub fn ramp_settings(&self) -> RampSettings {
        RampSettings {
            reference_sensor: self.reference_sensor.clone(),
            poll_interval: self.poll_interval(),
            interlock_timeout: Duration::from_secs(self.interlock_timeout_secs),
            interlock_enabled: self.interlock_enabled,
        }
    }

    /// Range-check every field.  Rejects, never clamps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accuracy_c.is_nan() || self.accuracy_c <= 0.0 {
            return Err(ConfigError::ValidationFailed("accuracy_c must be > 0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "poll_interval_ms must be > 0",
            ));
        }
        if self.ramp_timeout_secs == 0 || self.interlock_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "ramp_timeout_secs and interlock_timeout_secs must be > 0",
            ));
        }
        if self.maximal_starting_secs < self.minimal_starting_secs {
            return Err(ConfigError::ValidationFailed(
                "maximal_starting_secs must be >= minimal_starting_secs",
            ));
        }
        let setpoints = [
            self.starting_temperature_c,
            self.starting_dew_point_c,
            self.heat_overshoot_c,
            self.cool_overshoot_c,
            self.safe_temperature_c,
        ];
        if !setpoints.iter().all(|t| t.is_finite()) {
            return Err(ConfigError::ValidationFailed(
                "temperatures and overshoots must be finite",
            ));
        }
        if self.starting_dew_point_c >= self.starting_temperature_c {
            return Err(ConfigError::ValidationFailed(
                "starting_dew_point_c must be below starting_temperature_c",
            ));
        }
        if self.min_interlock_distance_c.is_nan() || self.min_interlock_distance_c < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "min_interlock_distance_c must be >= 0",
            ));
        }
        if self.heat_overshoot_c < 0.0 || self.cool_overshoot_c > 0.0 {
            return Err(ConfigError::ValidationFailed(
                "heat_overshoot_c must be >= 0 and cool_overshoot_c <= 0",
            ));
        }
        if self
            .cycles
            .0
            .iter()
            .any(|b| b.temperatures_c.is_empty() || b.temperatures_c.iter().any(|t| !t.is_finite()))
        {
            return Err(ConfigError::ValidationFailed(
                "every cycle block needs finite temperatures",
            ));
        }
        if !self.sensors.iter().all(SensorDescriptor::is_consistent) {
            return Err(ConfigError::ValidationFailed(
                "sensor quantity does not match its source",
            ));
        }
        let mut names: Vec<&str> = self.sensors.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|w| w[0] == w[1]) {
            return Err(ConfigError::ValidationFailed("sensor names must be unique"));
        }
        if !self.sensors.iter().any(|s| s.name == self.reference_sensor) {
            return Err(ConfigError::ValidationFailed(
                "reference_sensor must name a sensor in the table",
            ));
        }
        Ok(())
    }
}
