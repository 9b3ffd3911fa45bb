//! Multi-cycle thermal-cycling runner.
//!
//! [`ThermocycleService`] owns the plan and drives a [`RampController`]
//! through it.  All I/O flows through the controller's ports and the
//! injected [`Notifier`], so the whole run is testable with mock adapters.
//!
//! ```text
//!  startup ──▶ cycle 1 … cycle N ──▶ return to safe temperature
//!     │              │
//!     └── error ─────┴──▶ safe setpoint, notify, propagate
//! ```

use std::time::Duration;

use log::{error, info, warn};

use crate::config::RunConfig;
use crate::control::ramp::{RampController, RampTarget};
use crate::error::Result;

use super::plan::RampStep;
use super::ports::{ClimateChamberPort, ClockPort, DataLogPort, HygrometerPort, Notifier};

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub cycles_completed: u32,
    pub elapsed: Duration,
}

// ───────────────────────────────────────────────────────────────
// ThermocycleService
// ───────────────────────────────────────────────────────────────

pub struct ThermocycleService {
    config: RunConfig,
    steps: Vec<RampStep>,
}

impl ThermocycleService {
    pub fn new(config: RunConfig) -> Self {
        let steps = config.cycles.steps(
            config.starting_temperature_c,
            config.heat_overshoot_c,
            config.cool_overshoot_c,
        );
        Self { config, steps }
    }

    pub fn steps(&self) -> &[RampStep] {
        &self.steps
    }

    /// Execute the whole run: startup, every plan step, safe return.
    ///
    /// Refuses to start on a bench that lacks the reference sensor or the
    /// air sensors the interlock needs.  On any later failure, including
    /// the final return to the safe temperature, the chamber is commanded
    /// to the safe temperature before the error is returned.
    pub fn run<C, H, K, L>(
        &self,
        ctl: &mut RampController<C, H, K, L>,
        notifier: &mut impl Notifier,
    ) -> Result<RunSummary>
    where
        C: ClimateChamberPort,
        H: HygrometerPort,
        K: ClockPort,
        L: DataLogPort,
    {
        if let Err(e) = ctl.check_bench() {
            error!("Bench check failed: {}", e);
            notifier.notify("Thermal cycling could not be started");
            return Err(e);
        }
        notifier.notify("Starting thermal cycles");

        if let Err(e) = ctl.start_data_log() {
            warn!("Data log header could not be written: {}", e);
        }
        ctl.chamber_mut().start_manual_mode()?;
        if let Err(e) = ctl.chamber_mut().set_air_dryer(true) {
            warn!("Air dryer could not be switched on: {}", e);
        }

        if let Err(e) = self.startup(ctl) {
            error!("Startup failed: {}", e);
            notifier.notify("Thermal cycling could not be started");
            self.safe_setpoint(ctl);
            return Err(e);
        }

        let started = ctl.clock().elapsed();
        match self.cycle(ctl).and_then(|n| self.finish(ctl).map(|()| n)) {
            Ok(cycles_completed) => {
                // Startup is not counted.
                let elapsed = ctl.clock().elapsed().saturating_sub(started);
                info!(
                    "Completed {} cycles in {:.2}h",
                    cycles_completed,
                    elapsed.as_secs_f64() / 3600.0
                );
                notifier.notify("Thermal cycles are finished");
                Ok(RunSummary {
                    cycles_completed,
                    elapsed,
                })
            }
            Err(e) => {
                error!("Thermal cycling aborted: {}", e);
                notifier.notify(&format!("An error occurred during thermal cycling: {e}"));
                self.safe_setpoint(ctl);
                Err(e)
            }
        }
    }

    // ── Phases ────────────────────────────────────────────────

    /// Settle at the starting temperature, then wait for dry air.
    fn startup<C, H, K, L>(&self, ctl: &mut RampController<C, H, K, L>) -> Result<()>
    where
        C: ClimateChamberPort,
        H: HygrometerPort,
        K: ClockPort,
        L: DataLogPort,
    {
        let cfg = &self.config;
        ctl.set_recording(cfg.save_data_on_startup);

        info!(
            "Going to starting temperature {}\u{00b0}C (at least {}s)",
            cfg.starting_temperature_c, cfg.minimal_starting_secs
        );
        let start = RampTarget::new(cfg.starting_temperature_c)
            .with_wait(Duration::from_secs(cfg.minimal_starting_secs))
            .with_accuracy(cfg.accuracy_c)
            .with_timeout(cfg.ramp_timeout());
        ctl.go_to_temperature(&start)?;

        info!("Waiting for dew point below {}\u{00b0}C", cfg.starting_dew_point_c);
        ctl.wait_for_min_dew_point(
            cfg.startup_dew_point_distance(),
            cfg.startup_dew_point_timeout(),
        )?;
        Ok(())
    }

    /// Run every plan step.  Returns the number of completed cycles.
    fn cycle<C, H, K, L>(&self, ctl: &mut RampController<C, H, K, L>) -> Result<u32>
    where
        C: ClimateChamberPort,
        H: HygrometerPort,
        K: ClockPort,
        L: DataLogPort,
    {
        ctl.set_recording(true);
        let mut completed = 0;

        for step in &self.steps {
            if step.starts_cycle {
                info!("Starting cycle {}", step.cycle);
            }
            if step.is_cooling() {
                info!("Cooling to {}", step.target_c);
            } else {
                info!("Heating to {}", step.target_c);
            }

            let target = RampTarget::new(step.target_c)
                .with_overshoot(step.overshoot_c)
                .with_wait(step.wait_time)
                .with_accuracy(self.config.accuracy_c)
                .with_timeout(self.config.ramp_timeout());
            ctl.go_to_temperature(&target)?;
            completed = step.cycle;
        }
        Ok(completed)
    }

    /// Return to the safe temperature after a successful plan.
    fn finish<C, H, K, L>(&self, ctl: &mut RampController<C, H, K, L>) -> Result<()>
    where
        C: ClimateChamberPort,
        H: HygrometerPort,
        K: ClockPort,
        L: DataLogPort,
    {
        let safe = self.config.safe_temperature_c;
        info!("Returning to {}\u{00b0}C", safe);
        ctl.command_setpoint(safe)?;
        let target = RampTarget::new(safe)
            .with_accuracy(self.config.accuracy_c)
            .with_timeout(self.config.ramp_timeout());
        ctl.go_to_temperature(&target)?;

        if let Err(e) = ctl.chamber_mut().stop_manual_mode() {
            warn!("Manual mode could not be stopped: {}", e);
        }
        Ok(())
    }

    /// Command the safe temperature after a failure.  Never masks the
    /// original error.
    fn safe_setpoint<C, H, K, L>(&self, ctl: &mut RampController<C, H, K, L>)
    where
        C: ClimateChamberPort,
        H: HygrometerPort,
        K: ClockPort,
        L: DataLogPort,
    {
        let safe = self.config.safe_temperature_c;
        match ctl.command_setpoint(safe) {
            Ok(()) => info!("Chamber set to safe temperature {}\u{00b0}C", safe),
            Err(e) => error!("Safe shutdown failed: {}", e),
        }
    }
}
