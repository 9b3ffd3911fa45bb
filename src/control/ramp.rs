//! Temperature ramp controller with dew-point interlock.
//!
//! Every control tick runs in the same order:
//!
//! ```text
//!   acquire ──▶ interlock check ──▶ target test ──▶ sleep
//! ```
//!
//! so no tick can report "target reached" while the interlock is active.
//! When the interlock trips, the chamber is not merely paused: the setpoint
//! is moved to the *measured* chamber temperature, held there until the
//! modules are safely above the dew point again, and then restored.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::app::ports::{ClimateChamberPort, ClockPort, DataLogPort, HygrometerPort};
use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::safety::DewPointInterlock;
use crate::sensors::{Quantity, ReadingSet, SensorDescriptor, SensorHub, SensorSource};

// ───────────────────────────────────────────────────────────────
// Types
// ───────────────────────────────────────────────────────────────

/// The instruments the controller drives: one chamber and any number of
/// thermohygrometers keyed by device name.
pub struct Bench<C, H> {
    pub chamber: C,
    pub hygrometers: BTreeMap<String, H>,
}

impl<C, H> Bench<C, H> {
    pub fn new(chamber: C) -> Self {
        Self {
            chamber,
            hygrometers: BTreeMap::new(),
        }
    }

    pub fn with_hygrometer(mut self, device: impl Into<String>, hygrometer: H) -> Self {
        self.hygrometers.insert(device.into(), hygrometer);
        self
    }
}

/// Controller settings that do not change between ramps.
#[derive(Debug, Clone, PartialEq)]
pub struct RampSettings {
    /// Sensor whose temperature decides convergence.
    pub reference_sensor: String,
    pub poll_interval: Duration,
    pub interlock_timeout: Duration,
    pub interlock_enabled: bool,
}

/// One ramp request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampTarget {
    pub target_c: f64,
    /// Added to the setpoint until the accuracy window is entered.
    pub overshoot_c: f64,
    /// Dwell at the target after convergence.
    pub wait_time: Duration,
    /// Half-width of the (open) convergence window.
    pub accuracy_c: f64,
    pub timeout: Duration,
}

impl RampTarget {
    pub fn new(target_c: f64) -> Self {
        Self {
            target_c,
            overshoot_c: 0.0,
            wait_time: Duration::ZERO,
            accuracy_c: 1.0,
            timeout: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_overshoot(mut self, overshoot_c: f64) -> Self {
        self.overshoot_c = overshoot_c;
        self
    }

    pub fn with_wait(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn with_accuracy(mut self, accuracy_c: f64) -> Self {
        self.accuracy_c = accuracy_c;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Setpoint commanded while approaching.
    pub fn approach_setpoint(&self) -> f64 {
        self.target_c + self.overshoot_c
    }

    /// Strictly inside `(target - accuracy, target + accuracy)`.
    pub fn contains(&self, t: f64) -> bool {
        t > self.target_c - self.accuracy_c && t < self.target_c + self.accuracy_c
    }

    /// Strictly outside the window.
    pub fn deviates(&self, t: f64) -> bool {
        t < self.target_c - self.accuracy_c || t > self.target_c + self.accuracy_c
    }
}

/// Outcome of a bounded wait loop.
#[derive(Debug)]
enum Convergence {
    Converged(ReadingSet),
    TimedOut,
}

// ───────────────────────────────────────────────────────────────
// RampController
// ───────────────────────────────────────────────────────────────

/// Drives the chamber toward setpoints while guarding the dew point.
pub struct RampController<C, H, K, L> {
    bench: Bench<C, H>,
    clock: K,
    data_log: L,
    hub: SensorHub,
    interlock: DewPointInterlock,
    settings: RampSettings,
    /// Write log lines and data records on every acquire.
    recording: bool,
    /// Last setpoint this controller commanded.
    commanded_setpoint: Option<f64>,
}

impl<C, H, K, L> RampController<C, H, K, L>
where
    C: ClimateChamberPort,
    H: HygrometerPort,
    K: ClockPort,
    L: DataLogPort,
{
    pub fn new(
        bench: Bench<C, H>,
        clock: K,
        data_log: L,
        hub: SensorHub,
        interlock: DewPointInterlock,
        settings: RampSettings,
    ) -> Self {
        Self {
            bench,
            clock,
            data_log,
            hub,
            interlock,
            settings,
            recording: true,
            commanded_setpoint: None,
        }
    }

    /// Build a controller from the run configuration.
    pub fn from_config(config: &RunConfig, bench: Bench<C, H>, clock: K, data_log: L) -> Self {
        let hub = SensorHub::new(config.sensors.clone(), config.air_sensors.clone());
        let interlock = DewPointInterlock::new(config);
        Self::new(bench, clock, data_log, hub, interlock, config.ramp_settings())
    }

    /// Check that the sensors the control loop depends on have an
    /// instrument on this bench: the reference sensor always, and an air
    /// temperature plus an air humidity when the interlock is enabled.
    ///
    /// Without them a ramp could never converge, or the interlock could
    /// never trip.
    pub fn check_bench(&self) -> Result<()> {
        let descriptors = self.hub.descriptors();
        let reference = descriptors
            .iter()
            .find(|d| d.name == self.settings.reference_sensor);
        if !reference.is_some_and(|d| self.is_attached(d)) {
            return Err(Error::Config(
                "reference sensor has no instrument on this bench",
            ));
        }

        if self.settings.interlock_enabled {
            let air_source = |quantity: Quantity| {
                descriptors.iter().any(|d| {
                    d.quantity == quantity
                        && self.hub.air_locations().contains(&d.location)
                        && self.is_attached(d)
                })
            };
            if !air_source(Quantity::Temperature) || !air_source(Quantity::Humidity) {
                return Err(Error::Config(
                    "interlock needs an air temperature and an air humidity sensor on this bench",
                ));
            }
        }
        Ok(())
    }

    // ── Data log ──────────────────────────────────────────────

    /// Write the data-log header (sensor names + dew point).
    pub fn start_data_log(&mut self) -> io::Result<()> {
        let columns = self.hub.columns();
        self.data_log.begin(&columns)
    }

    pub fn set_recording(&mut self, on: bool) {
        self.recording = on;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    // ── Operations ────────────────────────────────────────────

    /// Poll every sensor once.
    ///
    /// Never fails: unreadable sensors are `None` in the returned set.
    /// While recording, one log line and one data record are written.
    pub fn acquire(&mut self) -> ReadingSet {
        let now = self.clock.wall_clock();
        let readings = self
            .hub
            .read_all(&mut self.bench.chamber, &mut self.bench.hygrometers, now);

        if self.recording {
            info!("{}", readings.summary());
            if let Err(e) = self.data_log.record(&readings) {
                error!("Data log write failed: {}", e);
            }
        } else {
            debug!("{}", readings.summary());
        }
        readings
    }

    /// If any module is too close to the dew point, hold the chamber at
    /// its measured temperature until the condition clears, then restore
    /// the previous setpoint.
    ///
    /// Returns the freshest readings: the input set when nothing was at
    /// risk, otherwise the set on which the risk was found cleared.
    pub fn check_interlock(&mut self, readings: ReadingSet) -> Result<ReadingSet> {
        if !self.interlock.evaluate(&readings) {
            return Ok(readings);
        }

        let restore = match self.bench.chamber.temperature_setpoint() {
            Ok(sp) => sp,
            Err(e) => match self.commanded_setpoint {
                Some(sp) => {
                    warn!("Setpoint readback failed ({}), restoring last commanded {:.2}", e, sp);
                    sp
                }
                None => return Err(e.into()),
            },
        };
        let hold = self.bench.chamber.temperature()?;
        warn!(
            "Interlock hold: chamber at {:.2}\u{00b0}C (setpoint was {:.2}\u{00b0}C), coldest module {:?}",
            hold,
            restore,
            self.interlock.coldest_module(&readings)
        );
        self.command_setpoint(hold)?;

        let distance = self.interlock.min_distance();
        let timeout = self.settings.interlock_timeout;
        let fresh = self.wait_for_min_dew_point(distance, timeout)?;
        self.interlock.evaluate(&fresh);

        info!("Interlock released, restoring setpoint {:.2}\u{00b0}C", restore);
        self.command_setpoint(restore)?;
        Ok(fresh)
    }

    /// Poll until every module is at least `distance` above the dew point.
    ///
    /// Fails with [`Error::InterlockTimeout`] if that takes longer than
    /// `timeout`.
    pub fn wait_for_min_dew_point(
        &mut self,
        distance: f64,
        timeout: Duration,
    ) -> Result<ReadingSet> {
        match self.dry_out(distance, timeout)? {
            Convergence::Converged(readings) => {
                info!("Target dew point reached!");
                Ok(readings)
            }
            Convergence::TimedOut => {
                error!(
                    "Target dew point could not be reached within {}s",
                    timeout.as_secs()
                );
                Err(Error::InterlockTimeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Ramp to `target`, then dwell there.
    ///
    /// 1. Command `target + overshoot`.
    /// 2. Tick until the reference sensor is inside the window, or fail
    ///    with [`Error::RampTimeout`].
    /// 3. Command exactly `target`.
    /// 4. Keep ticking for `wait_time`, warning on every deviation.
    pub fn go_to_temperature(&mut self, target: &RampTarget) -> Result<()> {
        let setpoint = target.approach_setpoint();
        debug!(
            "Ramp to {:.2}\u{00b0}C (setpoint {:.2}\u{00b0}C, accuracy {:.2}, timeout {}s)",
            target.target_c,
            setpoint,
            target.accuracy_c,
            target.timeout.as_secs()
        );
        self.command_setpoint(setpoint)?;

        match self.approach(target)? {
            Convergence::Converged(readings) => {
                info!(
                    "Target temperature reached on device! ({} = {:.2})",
                    self.settings.reference_sensor,
                    readings.get(&self.settings.reference_sensor).unwrap_or(f64::NAN)
                );
            }
            Convergence::TimedOut => {
                error!(
                    "Target temperature {} could not be reached within {}s",
                    target.target_c,
                    target.timeout.as_secs()
                );
                return Err(Error::RampTimeout {
                    target: target.target_c,
                    timeout_secs: target.timeout.as_secs(),
                });
            }
        }

        self.command_setpoint(target.target_c)?;
        if !target.wait_time.is_zero() {
            self.dwell(target)?;
        }
        Ok(())
    }

    /// Command a chamber setpoint.  Must succeed.
    pub fn command_setpoint(&mut self, celsius: f64) -> Result<()> {
        if let Err(e) = self.bench.chamber.set_temperature(celsius) {
            error!("Unable to set temperature {:.2}: {}", celsius, e);
            return Err(e.into());
        }
        self.commanded_setpoint = Some(celsius);
        Ok(())
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn bench(&self) -> &Bench<C, H> {
        &self.bench
    }

    pub fn bench_mut(&mut self) -> &mut Bench<C, H> {
        &mut self.bench
    }

    pub fn chamber_mut(&mut self) -> &mut C {
        &mut self.bench.chamber
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    pub fn data_log(&self) -> &L {
        &self.data_log
    }

    pub fn interlock(&self) -> &DewPointInterlock {
        &self.interlock
    }

    pub fn settings(&self) -> &RampSettings {
        &self.settings
    }

    pub fn commanded_setpoint(&self) -> Option<f64> {
        self.commanded_setpoint
    }

    // ── Internal ──────────────────────────────────────────────

    /// One control tick: acquire, then the interlock check.
    fn tick(&mut self) -> Result<ReadingSet> {
        let readings = self.acquire();
        if self.settings.interlock_enabled {
            self.check_interlock(readings)
        } else {
            Ok(readings)
        }
    }

    fn is_attached(&self, descriptor: &SensorDescriptor) -> bool {
        match &descriptor.source {
            SensorSource::Hygrometer { device, .. } => self.bench.hygrometers.contains_key(device),
            SensorSource::ChamberTemperature | SensorSource::ChamberSetpoint => true,
        }
    }

    fn reference(&self, readings: &ReadingSet) -> Option<f64> {
        readings.get(&self.settings.reference_sensor)
    }

    fn since(&self, start: Duration) -> Duration {
        self.clock.elapsed().saturating_sub(start)
    }

    fn approach(&mut self, target: &RampTarget) -> Result<Convergence> {
        let start = self.clock.elapsed();
        loop {
            let readings = self.tick()?;
            if self.reference(&readings).is_some_and(|t| target.contains(t)) {
                return Ok(Convergence::Converged(readings));
            }
            if self.since(start) > target.timeout {
                return Ok(Convergence::TimedOut);
            }
            self.clock.sleep(self.settings.poll_interval)?;
        }
    }

    fn dry_out(&mut self, distance: f64, timeout: Duration) -> Result<Convergence> {
        let start = self.clock.elapsed();
        let mut readings = self.acquire();
        while self.interlock.at_risk(&readings, distance) {
            if self.since(start) > timeout {
                return Ok(Convergence::TimedOut);
            }
            self.clock.sleep(self.settings.poll_interval)?;
            readings = self.acquire();
        }
        Ok(Convergence::Converged(readings))
    }

    fn dwell(&mut self, target: &RampTarget) -> Result<()> {
        info!(
            "Waiting for {:.0}s at {}\u{00b0}C...",
            target.wait_time.as_secs_f64(),
            target.target_c
        );
        let start = self.clock.elapsed();
        loop {
            let readings = self.tick()?;
            match self.reference(&readings) {
                Some(t) if target.deviates(t) => warn!(
                    "Temperature on device deviated too much: Target = {}, {} = {:.2}",
                    target.target_c, self.settings.reference_sensor, t
                ),
                Some(_) => {}
                None => debug!("Reference sensor {} unavailable", self.settings.reference_sensor),
            }
            if self.since(start) > target.wait_time {
                info!("Wait time over. Continuing...");
                return Ok(());
            }
            self.clock.sleep(self.settings.poll_interval)?;
        }
    }
}
