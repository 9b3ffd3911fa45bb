//! Multi-cycle runner: startup, cycling, failure handling and a full run
//! on the simulated bench.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use chrono::{DateTime, Utc};

use thermocycle::adapters::sim::{self, SimClock, SimConfig, SimEnvironment};
use thermocycle::app::plan::{CycleBlock, CyclePlan};
use thermocycle::app::service::ThermocycleService;
use thermocycle::config::RunConfig;
use thermocycle::control::ramp::RampController;
use thermocycle::error::{DeviceError, Error};

use crate::mock_hw::{
    ChamberCall, MemoryLog, RecordingNotifier, Scenario, chamber, controller, test_config,
};

fn one_cycle(config: RunConfig) -> RunConfig {
    RunConfig {
        cycles: CyclePlan(vec![CycleBlock {
            n_cycles: 1,
            temperatures_c: vec![-45.0, 40.0],
            wait_secs: 2,
        }]),
        ..config
    }
}

// ── Mock bench ────────────────────────────────────────────────

#[test]
fn startup_failure_notifies_and_returns_to_safe_temperature() {
    // Air never gets dry enough for the 45 °C startup margin.
    let config = test_config();
    let mut ctl = controller(&config, Scenario::module(&[20.0]).dew_points(&[10.0]));
    let mut notifier = RecordingNotifier::default();

    let err = ThermocycleService::new(config)
        .run(&mut ctl, &mut notifier)
        .unwrap_err();

    assert_eq!(err, Error::InterlockTimeout { timeout_secs: 8 });
    assert_eq!(
        notifier.messages,
        vec!["Starting thermal cycles", "Thermal cycling could not be started"]
    );
    assert_eq!(chamber(&ctl).last_setpoint(), Some(20.0));
    assert_eq!(
        chamber(&ctl).calls[..2],
        [ChamberCall::StartManualMode, ChamberCall::SetAirDryer(true)]
    );
}

#[test]
fn startup_readings_are_not_recorded_when_disabled() {
    let config = RunConfig {
        save_data_on_startup: false,
        ..test_config()
    };
    let mut ctl = controller(&config, Scenario::module(&[20.0]).dew_points(&[10.0]));

    let _ = ThermocycleService::new(config).run(&mut ctl, &mut RecordingNotifier::default());

    assert!(ctl.data_log().records.is_empty());
    assert_eq!(ctl.data_log().header.last().map(String::as_str), Some("dew_point"));
}

#[test]
fn cycle_failure_notifies_and_returns_to_safe_temperature() {
    // Startup succeeds (module at 20 °C, dry air), then the module never
    // cools down.
    let config = RunConfig {
        ramp_timeout_secs: 10,
        ..one_cycle(test_config())
    };
    let mut ctl = controller(&config, Scenario::module(&[20.0]));
    let mut notifier = RecordingNotifier::default();

    let err = ThermocycleService::new(config)
        .run(&mut ctl, &mut notifier)
        .unwrap_err();

    assert_eq!(
        err,
        Error::RampTimeout {
            target: -45.0,
            timeout_secs: 10
        }
    );
    assert_eq!(notifier.messages.len(), 2);
    assert_eq!(
        notifier.messages[1],
        "An error occurred during thermal cycling: target temperature -45 could not be reached within 10s"
    );
    // 20 (startup), 20 (startup dwell), -55 (cooling with overshoot), 20 (safe)
    assert_eq!(chamber(&ctl).setpoints(), vec![20.0, 20.0, -55.0, 20.0]);
}

#[test]
fn interrupt_returns_to_safe_temperature() {
    let config = one_cycle(test_config());
    let mut ctl = controller(&config, Scenario::module(&[20.0]).interrupt_at(5));
    let mut notifier = RecordingNotifier::default();

    let err = ThermocycleService::new(config)
        .run(&mut ctl, &mut notifier)
        .unwrap_err();

    assert_eq!(err, Error::Interrupted);
    assert_eq!(chamber(&ctl).last_setpoint(), Some(20.0));
    assert!(
        notifier
            .messages
            .iter()
            .any(|m| m.ends_with("interrupted by operator"))
    );
}

#[test]
fn manual_mode_failure_aborts_before_any_setpoint() {
    let config = test_config();
    let mut ctl = controller(&config, Scenario::module(&[20.0]));
    ctl.chamber_mut().reject_manual_mode = true;

    let err = ThermocycleService::new(config)
        .run(&mut ctl, &mut RecordingNotifier::default())
        .unwrap_err();

    assert_eq!(err, Error::Device(DeviceError::Rejected(-5)));
    assert!(chamber(&ctl).setpoints().is_empty());
}

#[test]
fn air_dryer_failure_is_not_fatal() {
    // Startup only: the dryer is rejected, startup still fails later on
    // the dew point, not on the dryer.
    let config = test_config();
    let mut ctl = controller(&config, Scenario::module(&[20.0]).dew_points(&[10.0]));
    ctl.chamber_mut().reject_air_dryer = true;

    let err = ThermocycleService::new(config)
        .run(&mut ctl, &mut RecordingNotifier::default())
        .unwrap_err();

    assert!(matches!(err, Error::InterlockTimeout { .. }));
}

#[test]
fn bench_without_hygrometers_is_rejected_before_any_command() {
    let config = test_config();
    let mut ctl = controller(&config, Scenario::module(&[20.0]));
    ctl.bench_mut().hygrometers.clear();
    let mut notifier = RecordingNotifier::default();

    let err = ThermocycleService::new(config)
        .run(&mut ctl, &mut notifier)
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert!(chamber(&ctl).calls.is_empty());
    assert_eq!(notifier.messages, vec!["Thermal cycling could not be started"]);
}

#[test]
fn chamber_reference_needs_air_sensors_only_with_interlock() {
    let with_interlock = RunConfig {
        reference_sensor: "t_chamber".into(),
        ..test_config()
    };
    let mut ctl = controller(&with_interlock, Scenario::module(&[20.0]));
    ctl.bench_mut().hygrometers.clear();
    assert!(matches!(ctl.check_bench(), Err(Error::Config(_))));

    let without_interlock = RunConfig {
        interlock_enabled: false,
        ..with_interlock
    };
    let mut ctl = controller(&without_interlock, Scenario::module(&[20.0]));
    ctl.bench_mut().hygrometers.clear();
    assert_eq!(ctl.check_bench(), Ok(()));
}

#[test]
fn unknown_air_location_is_rejected() {
    let config = RunConfig {
        air_sensors: vec!["outside".into()],
        ..test_config()
    };
    let ctl = controller(&config, Scenario::module(&[20.0]));
    assert!(matches!(ctl.check_bench(), Err(Error::Config(_))));
}

#[test]
fn failed_return_to_safe_temperature_notifies() {
    // Startup on ticks 0-3, -45 °C on ticks 4-7, then the module stays at
    // 40 °C and never comes back to 20 °C.
    let config = one_cycle(test_config());
    let scenario = Scenario::module(&[20.0, 20.0, 20.0, 20.0, -45.0, -45.0, -45.0, -45.0, 40.0]);
    let mut ctl = controller(&config, scenario);
    let mut notifier = RecordingNotifier::default();

    let err = ThermocycleService::new(config)
        .run(&mut ctl, &mut notifier)
        .unwrap_err();

    assert_eq!(
        err,
        Error::RampTimeout {
            target: 20.0,
            timeout_secs: 60
        }
    );
    assert_eq!(
        notifier.messages,
        vec![
            "Starting thermal cycles",
            "An error occurred during thermal cycling: target temperature 20 could not be reached within 60s"
        ]
    );
    assert_eq!(chamber(&ctl).last_setpoint(), Some(20.0));
    assert!(!chamber(&ctl).calls.contains(&ChamberCall::StopManualMode));
}

#[test]
fn plan_steps_alternate_cooling_and_heating() {
    let service = ThermocycleService::new(RunConfig::default());
    let overshoots: Vec<f64> = service.steps().iter().map(|s| s.overshoot_c).collect();
    assert_eq!(overshoots, vec![-10.0, 5.0, -10.0, 5.0, -10.0, 5.0]);
}

// ── Simulated bench ───────────────────────────────────────────

#[test]
fn default_plan_completes_on_simulated_bench() {
    let config = RunConfig::default();
    let env = SimEnvironment::shared(SimConfig::default());
    let clock = SimClock::new(env.clone(), DateTime::<Utc>::UNIX_EPOCH)
        .with_interrupt(Arc::new(AtomicBool::new(false)));
    let mut ctl =
        RampController::from_config(&config, sim::bench(&env), clock, MemoryLog::default());
    let mut notifier = RecordingNotifier::default();

    let summary = ThermocycleService::new(config)
        .run(&mut ctl, &mut notifier)
        .unwrap();

    assert_eq!(summary.cycles_completed, 3);
    assert!(summary.elapsed.as_secs() > 3 * 2 * 120);
    assert_eq!(
        notifier.messages,
        vec!["Starting thermal cycles", "Thermal cycles are finished"]
    );

    let env = env.borrow();
    assert_eq!(env.setpoint(), 20.0);
    assert!(env.dryer_on());
    assert!(!env.manual_mode());
    assert!((env.module_temperature() - 20.0).abs() < 1.0);
}
