//! Mock bench for integration tests.
//!
//! Every scripted value is indexed by the current control tick, which the
//! [`FakeClock`] advances on each sleep.  A script shorter than the run
//! repeats its last entry; `None` entries read as unavailable.  The chamber
//! records every command so tests can assert on the full history.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use thermocycle::app::ports::{ClimateChamberPort, ClockPort, DataLogPort, HygrometerPort, Notifier};
use thermocycle::config::RunConfig;
use thermocycle::control::ramp::{Bench, RampController};
use thermocycle::error::{DeviceError, Error};
use thermocycle::sensors::dew_point::relative_humidity;
use thermocycle::sensors::{Quantity, ReadingSet, SensorDescriptor, SensorSource};

/// Hygrometer device name used by the test sensor table.
pub const TH: &str = "TH";
/// Air temperature seen by the air probe.
pub const AIR_C: f64 = 20.0;

pub type Tick = Rc<Cell<usize>>;

/// Per-tick value sequence.
#[derive(Debug, Clone, Default)]
pub struct Script(Vec<Option<f64>>);

impl Script {
    pub fn of(values: &[f64]) -> Self {
        Self(values.iter().copied().map(Some).collect())
    }

    pub fn with_gaps(values: &[Option<f64>]) -> Self {
        Self(values.to_vec())
    }

    pub fn constant(value: f64) -> Self {
        Self(vec![Some(value)])
    }

    pub fn at(&self, tick: usize) -> Option<f64> {
        self.0.get(tick).or(self.0.last()).copied().flatten()
    }
}

// ── Chamber ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ChamberCall {
    SetTemperature(f64),
    StartManualMode,
    StopManualMode,
    SetAirDryer(bool),
}

pub struct ScriptedChamber {
    tick: Tick,
    temperature: Script,
    setpoint: Option<f64>,
    pub calls: Vec<ChamberCall>,
    /// Report the last accepted setpoint on readback.
    pub setpoint_readback: bool,
    pub reject_setpoints: bool,
    pub reject_manual_mode: bool,
    pub reject_air_dryer: bool,
}

impl ScriptedChamber {
    pub fn setpoints(&self) -> Vec<f64> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                ChamberCall::SetTemperature(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    pub fn last_setpoint(&self) -> Option<f64> {
        self.setpoints().last().copied()
    }
}

impl ClimateChamberPort for ScriptedChamber {
    fn temperature(&mut self) -> Result<f64, DeviceError> {
        self.temperature
            .at(self.tick.get())
            .ok_or(DeviceError::Unavailable)
    }

    fn temperature_setpoint(&mut self) -> Result<f64, DeviceError> {
        if self.setpoint_readback {
            self.setpoint.ok_or(DeviceError::Unavailable)
        } else {
            Err(DeviceError::Unsupported("get_setpoint"))
        }
    }

    fn set_temperature(&mut self, celsius: f64) -> Result<(), DeviceError> {
        self.calls.push(ChamberCall::SetTemperature(celsius));
        if self.reject_setpoints {
            return Err(DeviceError::Rejected(-6));
        }
        self.setpoint = Some(celsius);
        Ok(())
    }

    fn start_manual_mode(&mut self) -> Result<(), DeviceError> {
        self.calls.push(ChamberCall::StartManualMode);
        if self.reject_manual_mode {
            return Err(DeviceError::Rejected(-5));
        }
        Ok(())
    }

    fn stop_manual_mode(&mut self) -> Result<(), DeviceError> {
        self.calls.push(ChamberCall::StopManualMode);
        Ok(())
    }

    fn set_air_dryer(&mut self, on: bool) -> Result<(), DeviceError> {
        self.calls.push(ChamberCall::SetAirDryer(on));
        if self.reject_air_dryer {
            return Err(DeviceError::Unsupported("air_dryer"));
        }
        Ok(())
    }
}

// ── Hygrometer ────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub temperature: Script,
    pub humidity: Script,
}

pub struct ScriptedHygrometer {
    tick: Tick,
    channels: BTreeMap<u8, Channel>,
}

impl ScriptedHygrometer {
    fn channel(&self, channel: u8) -> Result<&Channel, DeviceError> {
        self.channels.get(&channel).ok_or(DeviceError::Unavailable)
    }
}

impl HygrometerPort for ScriptedHygrometer {
    fn temperature(&mut self, channel: u8) -> Result<f64, DeviceError> {
        self.channel(channel)?
            .temperature
            .at(self.tick.get())
            .ok_or(DeviceError::Unavailable)
    }

    fn humidity(&mut self, channel: u8) -> Result<f64, DeviceError> {
        self.channel(channel)?
            .humidity
            .at(self.tick.get())
            .ok_or(DeviceError::Unavailable)
    }

    fn dew_point(&mut self, _channel: u8) -> Result<f64, DeviceError> {
        Err(DeviceError::Unsupported("dew_point"))
    }
}

// ── Clock ─────────────────────────────────────────────────────

pub struct FakeClock {
    tick: Tick,
    elapsed: Duration,
    pub sleeps: usize,
    /// Fail the n-th sleep (0-based) and every later one with `Interrupted`.
    pub interrupt_at: Option<usize>,
}

impl ClockPort for FakeClock {
    fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(self.elapsed.as_millis() as i64)
    }

    fn sleep(&mut self, duration: Duration) -> Result<(), Error> {
        if self.interrupt_at.is_some_and(|n| self.sleeps >= n) {
            return Err(Error::Interrupted);
        }
        self.sleeps += 1;
        self.elapsed += duration;
        self.tick.set(self.tick.get() + 1);
        Ok(())
    }
}

// ── Data log / notifier ───────────────────────────────────────

#[derive(Default)]
pub struct MemoryLog {
    pub header: Vec<String>,
    pub records: Vec<ReadingSet>,
}

impl DataLogPort for MemoryLog {
    fn begin(&mut self, columns: &[&str]) -> std::io::Result<()> {
        self.header = columns.iter().map(|c| (*c).to_string()).collect();
        Ok(())
    }

    fn record(&mut self, readings: &ReadingSet) -> std::io::Result<()> {
        self.records.push(readings.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Vec<String>,
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, message: &str) {
        self.messages.push(message.to_string());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// Scripted inputs for one test bench.
///
/// Sensor table: `t_chamber` (chamber), `t_setp` (setpoint), `t_mod`
/// (module probe, channel 0), `t_air` + `h_air` (air probe, channel 1).
pub struct Scenario {
    pub chamber: Script,
    pub module: Script,
    pub air_humidity: Script,
    pub setpoint_readback: bool,
    pub interrupt_at: Option<usize>,
}

impl Scenario {
    /// Module follows `module`; the air stays dry (dew point -60 °C).
    pub fn module(values: &[f64]) -> Self {
        Self {
            chamber: Script::constant(AIR_C),
            module: Script::of(values),
            air_humidity: Script::constant(rh_for_dew_point(-60.0)),
            setpoint_readback: true,
            interrupt_at: None,
        }
    }

    pub fn chamber(mut self, values: &[f64]) -> Self {
        self.chamber = Script::of(values);
        self
    }

    /// Air dew point per tick.
    pub fn dew_points(mut self, values: &[f64]) -> Self {
        self.air_humidity = Script::of(&values.iter().map(|dp| rh_for_dew_point(*dp)).collect::<Vec<_>>());
        self
    }

    pub fn air_humidity(mut self, script: Script) -> Self {
        self.air_humidity = script;
        self
    }

    /// Operator interrupt on the n-th sleep.
    pub fn interrupt_at(mut self, sleep: usize) -> Self {
        self.interrupt_at = Some(sleep);
        self
    }

    pub fn without_setpoint_readback(mut self) -> Self {
        self.setpoint_readback = false;
        self
    }
}

/// Relative humidity of the air probe that yields dew point `dp`.
pub fn rh_for_dew_point(dp: f64) -> f64 {
    relative_humidity(AIR_C, dp)
}

pub fn sensor_table() -> Vec<SensorDescriptor> {
    let hygro = |name: &str, short: &str, quantity, location: &str, channel| SensorDescriptor {
        name: name.into(),
        short: Some(short.into()),
        quantity,
        location: location.into(),
        source: SensorSource::Hygrometer {
            device: TH.into(),
            channel,
        },
    };
    vec![
        SensorDescriptor {
            name: "t_chamber".into(),
            short: Some("t_ch".into()),
            quantity: Quantity::Temperature,
            location: "chamber".into(),
            source: SensorSource::ChamberTemperature,
        },
        SensorDescriptor {
            name: "t_setp".into(),
            short: Some("t_sp".into()),
            quantity: Quantity::Setpoint,
            location: "setp".into(),
            source: SensorSource::ChamberSetpoint,
        },
        hygro("t_mod", "t_m", Quantity::Temperature, "mod", 0),
        hygro("t_air", "t_a", Quantity::Temperature, "air", 1),
        hygro("h_air", "h_a", Quantity::Humidity, "air", 1),
    ]
}

/// Config matching [`sensor_table`]: reference `t_mod`, 1 s ticks, short
/// timeouts.
pub fn test_config() -> RunConfig {
    RunConfig {
        sensors: sensor_table(),
        reference_sensor: "t_mod".into(),
        air_sensors: vec!["air".into()],
        module_sensors: vec!["mod".into()],
        poll_interval_ms: 1000,
        ramp_timeout_secs: 60,
        interlock_timeout_secs: 30,
        minimal_starting_secs: 2,
        maximal_starting_secs: 10,
        ..RunConfig::default()
    }
}

pub type TestController = RampController<ScriptedChamber, ScriptedHygrometer, FakeClock, MemoryLog>;

pub fn controller(config: &RunConfig, scenario: Scenario) -> TestController {
    let tick: Tick = Rc::new(Cell::new(0));

    let chamber = ScriptedChamber {
        tick: Rc::clone(&tick),
        temperature: scenario.chamber,
        setpoint: None,
        calls: Vec::new(),
        setpoint_readback: scenario.setpoint_readback,
        reject_setpoints: false,
        reject_manual_mode: false,
        reject_air_dryer: false,
    };

    let mut channels = BTreeMap::new();
    channels.insert(
        0,
        Channel {
            temperature: scenario.module,
            humidity: Script::constant(10.0),
        },
    );
    channels.insert(
        1,
        Channel {
            temperature: Script::constant(AIR_C),
            humidity: scenario.air_humidity,
        },
    );
    let hygrometer = ScriptedHygrometer {
        tick: Rc::clone(&tick),
        channels,
    };

    let clock = FakeClock {
        tick,
        elapsed: Duration::ZERO,
        sleeps: 0,
        interrupt_at: scenario.interrupt_at,
    };

    RampController::from_config(
        config,
        Bench::new(chamber).with_hygrometer(TH, hygrometer),
        clock,
        MemoryLog::default(),
    )
}

pub fn chamber(ctl: &TestController) -> &ScriptedChamber {
    &ctl.bench().chamber
}
