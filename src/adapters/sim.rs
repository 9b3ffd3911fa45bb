//! Simulated bench.
//!
//! A first-order model of a climate chamber with a compressed-air dryer,
//! shared between a [`SimChamber`], any number of [`SimHygrometer`]s and a
//! [`SimClock`] that advances the model whenever the controller sleeps.
//! Runs on virtual time, so a full multi-hour plan completes in moments.
//!
//! - Air temperature moves toward the setpoint at `ramp_rate_c_per_min`.
//! - Module temperature follows the air with time constant `module_tau_secs`.
//! - Air dew point relaxes toward `dryer_dew_point_c` (dryer on) or
//!   `ambient_dew_point_c` (dryer off) with `dew_point_tau_secs`, and can
//!   never exceed the air temperature.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::app::ports::{ClimateChamberPort, ClockPort, HygrometerPort};
use crate::control::ramp::Bench;
use crate::error::{DeviceError, Error};
use crate::sensors::dew_point::relative_humidity;

/// Largest model integration step (seconds).
const MAX_STEP_SECS: f64 = 1.0;

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// What a simulated hygrometer channel is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Probe {
    Air,
    Module,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub initial_temperature_c: f64,
    pub initial_dew_point_c: f64,
    pub ramp_rate_c_per_min: f64,
    pub module_tau_secs: f64,
    pub dew_point_tau_secs: f64,
    pub dryer_dew_point_c: f64,
    pub ambient_dew_point_c: f64,
    /// Device name → probe per channel (index = channel number).
    pub hygrometers: BTreeMap<String, Vec<Probe>>,
}

impl Default for SimConfig {
    fn default() -> Self {
        let mut hygrometers = BTreeMap::new();
        // mod2 on 0, mod on 2, air on 3; channel 1 unused on the bench.
        hygrometers.insert(
            "Thermohygrometer".to_string(),
            vec![Probe::Module, Probe::Air, Probe::Module, Probe::Air],
        );
        hygrometers.insert("Thermohygrometer2".to_string(), vec![Probe::Air]);
        hygrometers.insert("Thermohygrometer3".to_string(), vec![Probe::Air]);

        Self {
            initial_temperature_c: 20.0,
            initial_dew_point_c: 10.0,
            ramp_rate_c_per_min: 5.0,
            module_tau_secs: 120.0,
            dew_point_tau_secs: 600.0,
            dryer_dew_point_c: -70.0,
            ambient_dew_point_c: 10.0,
            hygrometers,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Environment model
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimEnvironment {
    config: SimConfig,
    setpoint: f64,
    air: f64,
    module: f64,
    dew_point: f64,
    dryer_on: bool,
    manual_mode: bool,
}

/// Handle shared by every simulated instrument.
pub type SharedEnvironment = Rc<RefCell<SimEnvironment>>;

impl SimEnvironment {
    pub fn new(config: SimConfig) -> Self {
        let t0 = config.initial_temperature_c;
        Self {
            setpoint: t0,
            air: t0,
            module: t0,
            dew_point: config.initial_dew_point_c.min(t0),
            dryer_on: false,
            manual_mode: false,
            config,
        }
    }

    pub fn shared(config: SimConfig) -> SharedEnvironment {
        Rc::new(RefCell::new(Self::new(config)))
    }

    /// Advance the model by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let max_delta = self.config.ramp_rate_c_per_min / 60.0 * dt;
        self.air += (self.setpoint - self.air).clamp(-max_delta, max_delta);

        self.module += (self.air - self.module) * relax(dt, self.config.module_tau_secs);

        let dp_target = if self.dryer_on {
            self.config.dryer_dew_point_c
        } else {
            self.config.ambient_dew_point_c
        };
        self.dew_point += (dp_target - self.dew_point) * relax(dt, self.config.dew_point_tau_secs);
        self.dew_point = self.dew_point.min(self.air);
    }

    pub fn air_temperature(&self) -> f64 {
        self.air
    }

    pub fn module_temperature(&self) -> f64 {
        self.module
    }

    pub fn dew_point(&self) -> f64 {
        self.dew_point
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn dryer_on(&self) -> bool {
        self.dryer_on
    }

    pub fn manual_mode(&self) -> bool {
        self.manual_mode
    }

    fn probe_temperature(&self, probe: Probe) -> f64 {
        match probe {
            Probe::Air => self.air,
            Probe::Module => self.module,
        }
    }
}

/// Fraction of the remaining gap closed in `dt` by a first-order lag.
fn relax(dt: f64, tau: f64) -> f64 {
    if tau <= 0.0 { 1.0 } else { 1.0 - (-dt / tau).exp() }
}

// ───────────────────────────────────────────────────────────────
// Instruments
// ───────────────────────────────────────────────────────────────

pub struct SimChamber {
    env: SharedEnvironment,
}

impl SimChamber {
    pub fn new(env: SharedEnvironment) -> Self {
        Self { env }
    }
}

impl ClimateChamberPort for SimChamber {
    fn temperature(&mut self) -> Result<f64, DeviceError> {
        Ok(self.env.borrow().air)
    }

    fn temperature_setpoint(&mut self) -> Result<f64, DeviceError> {
        Ok(self.env.borrow().setpoint)
    }

    fn set_temperature(&mut self, celsius: f64) -> Result<(), DeviceError> {
        let mut env = self.env.borrow_mut();
        if !env.manual_mode {
            return Err(DeviceError::Rejected(-5));
        }
        debug!("sim: setpoint {:.2} -> {:.2}", env.setpoint, celsius);
        env.setpoint = celsius;
        Ok(())
    }

    fn start_manual_mode(&mut self) -> Result<(), DeviceError> {
        self.env.borrow_mut().manual_mode = true;
        Ok(())
    }

    fn stop_manual_mode(&mut self) -> Result<(), DeviceError> {
        self.env.borrow_mut().manual_mode = false;
        Ok(())
    }

    fn set_air_dryer(&mut self, on: bool) -> Result<(), DeviceError> {
        self.env.borrow_mut().dryer_on = on;
        Ok(())
    }
}

pub struct SimHygrometer {
    env: SharedEnvironment,
    probes: Vec<Probe>,
}

impl SimHygrometer {
    pub fn new(env: SharedEnvironment, probes: Vec<Probe>) -> Self {
        Self { env, probes }
    }

    fn probe(&self, channel: u8) -> Result<Probe, DeviceError> {
        self.probes
            .get(usize::from(channel))
            .copied()
            .ok_or(DeviceError::Unavailable)
    }
}

impl HygrometerPort for SimHygrometer {
    fn temperature(&mut self, channel: u8) -> Result<f64, DeviceError> {
        let probe = self.probe(channel)?;
        Ok(self.env.borrow().probe_temperature(probe))
    }

    fn humidity(&mut self, channel: u8) -> Result<f64, DeviceError> {
        let probe = self.probe(channel)?;
        let env = self.env.borrow();
        Ok(relative_humidity(env.probe_temperature(probe), env.dew_point))
    }

    fn dew_point(&mut self, channel: u8) -> Result<f64, DeviceError> {
        self.probe(channel)?;
        Ok(self.env.borrow().dew_point)
    }
}

/// Virtual clock.  Sleeping integrates the environment model.
pub struct SimClock {
    env: SharedEnvironment,
    epoch: DateTime<Utc>,
    elapsed: Duration,
    interrupt: Option<Arc<AtomicBool>>,
}

impl SimClock {
    pub fn new(env: SharedEnvironment, epoch: DateTime<Utc>) -> Self {
        Self {
            env,
            epoch,
            elapsed: Duration::ZERO,
            interrupt: None,
        }
    }

    /// Make `sleep` fail with [`Error::Interrupted`] once `flag` is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }
}

impl ClockPort for SimClock {
    fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.elapsed.as_millis()).unwrap_or(i64::MAX);
        self.epoch + TimeDelta::milliseconds(millis)
    }

    fn sleep(&mut self, duration: Duration) -> crate::error::Result<()> {
        if self
            .interrupt
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
        {
            return Err(Error::Interrupted);
        }
        let mut env = self.env.borrow_mut();
        let mut remaining = duration.as_secs_f64();
        while remaining > 0.0 {
            let dt = remaining.min(MAX_STEP_SECS);
            env.step(dt);
            remaining -= dt;
        }
        self.elapsed += duration;
        Ok(())
    }
}

/// Build a simulated bench whose instruments share `env`.
pub fn bench(env: &SharedEnvironment) -> Bench<SimChamber, SimHygrometer> {
    let probes = env.borrow().config.hygrometers.clone();
    probes.into_iter().fold(
        Bench::new(SimChamber::new(Rc::clone(env))),
        |bench, (device, probes)| {
            bench.with_hygrometer(device, SimHygrometer::new(Rc::clone(env), probes))
        },
    )
}
