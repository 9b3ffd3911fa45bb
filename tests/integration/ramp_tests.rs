//! Ramp controller against the scripted bench: convergence, timeout,
//! overshoot handling, dwell and degraded sensors.

use std::time::Duration;

use thermocycle::app::ports::ClockPort;
use thermocycle::control::ramp::RampTarget;
use thermocycle::error::{DeviceError, Error};

use crate::mock_hw::{Scenario, Script, chamber, controller, test_config};

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[test]
fn converges_on_the_tick_inside_the_open_window() {
    let mut ctl = controller(&test_config(), Scenario::module(&[25.0, 23.0, 21.0, 19.5]));
    let target = RampTarget::new(20.0).with_accuracy(1.0).with_timeout(secs(60));

    ctl.go_to_temperature(&target).unwrap();

    // 21.0 sits on the boundary and does not count.
    assert_eq!(ctl.clock().elapsed(), secs(3));
    assert_eq!(chamber(&ctl).setpoints(), vec![20.0, 20.0]);
    assert_eq!(ctl.data_log().records.len(), 4);
}

#[test]
fn never_entering_the_window_times_out() {
    let mut ctl = controller(&test_config(), Scenario::module(&[30.0]));
    let target = RampTarget::new(20.0).with_timeout(secs(10));

    let err = ctl.go_to_temperature(&target).unwrap_err();

    assert_eq!(
        err,
        Error::RampTimeout {
            target: 20.0,
            timeout_secs: 10
        }
    );
    assert!(ctl.clock().elapsed() >= secs(10));
    // The final target is never commanded after a timeout.
    assert_eq!(chamber(&ctl).setpoints(), vec![20.0]);
}

#[test]
fn overshoot_is_removed_once_converged() {
    let mut ctl = controller(&test_config(), Scenario::module(&[20.0, 0.0, -30.0, -45.2]));
    let target = RampTarget::new(-45.0).with_overshoot(-10.0);

    ctl.go_to_temperature(&target).unwrap();

    assert_eq!(chamber(&ctl).setpoints(), vec![-55.0, -45.0]);
    assert_eq!(ctl.commanded_setpoint(), Some(-45.0));
}

#[test]
fn dwell_keeps_ticking_for_wait_time() {
    // Converges on tick 1, then deviates during the dwell.
    let mut ctl = controller(
        &test_config(),
        Scenario::module(&[25.0, 20.2, 20.5, 23.0, 17.0, 20.0]),
    );
    let target = RampTarget::new(20.0).with_wait(secs(5));

    ctl.go_to_temperature(&target).unwrap();

    // Dwell starts at 1 s and ends on the first tick strictly past 5 s.
    assert_eq!(ctl.clock().elapsed(), secs(7));
    assert_eq!(chamber(&ctl).setpoints(), vec![20.0, 20.0]);
}

#[test]
fn zero_wait_returns_right_after_convergence() {
    let mut ctl = controller(&test_config(), Scenario::module(&[20.0]));
    ctl.go_to_temperature(&RampTarget::new(20.0)).unwrap();
    assert_eq!(ctl.clock().elapsed(), Duration::ZERO);
}

#[test]
fn missing_reference_reading_is_not_fatal() {
    let mut scenario = Scenario::module(&[]);
    scenario.module = Script::with_gaps(&[None, None, Some(20.1)]);
    let mut ctl = controller(&test_config(), scenario);

    ctl.go_to_temperature(&RampTarget::new(20.0)).unwrap();

    assert_eq!(ctl.clock().elapsed(), secs(2));
    let first = &ctl.data_log().records[0];
    assert_eq!(first.get("t_mod"), None);
    assert_eq!(first.get("t_air"), Some(20.0));
}

#[test]
fn rejected_setpoint_aborts() {
    let mut ctl = controller(&test_config(), Scenario::module(&[20.0]));
    ctl.chamber_mut().reject_setpoints = true;

    let err = ctl.go_to_temperature(&RampTarget::new(-40.0)).unwrap_err();

    assert_eq!(err, Error::Device(DeviceError::Rejected(-6)));
    assert_eq!(ctl.commanded_setpoint(), None);
    assert_eq!(ctl.clock().elapsed(), Duration::ZERO);
}

#[test]
fn interrupt_during_ramp_propagates() {
    let mut ctl = controller(
        &test_config(),
        Scenario::module(&[30.0]).interrupt_at(2),
    );

    let err = ctl.go_to_temperature(&RampTarget::new(20.0)).unwrap_err();

    assert_eq!(err, Error::Interrupted);
    assert_eq!(ctl.clock().elapsed(), secs(2));
}

#[test]
fn acquire_records_only_while_recording() {
    let mut ctl = controller(&test_config(), Scenario::module(&[20.0]));

    ctl.set_recording(false);
    let readings = ctl.acquire();
    assert!(ctl.data_log().records.is_empty());
    assert_eq!(readings.get("t_mod"), Some(20.0));

    ctl.set_recording(true);
    ctl.acquire();
    assert_eq!(ctl.data_log().records.len(), 1);
}

#[test]
fn data_log_header_lists_sensors_and_dew_point() {
    let mut ctl = controller(&test_config(), Scenario::module(&[20.0]));
    ctl.start_data_log().unwrap();
    assert_eq!(
        ctl.data_log().header,
        vec!["t_chamber", "t_setp", "t_mod", "t_air", "h_air", "dew_point"]
    );
}

#[test]
fn acquire_attaches_air_dew_point() {
    let mut ctl = controller(&test_config(), Scenario::module(&[0.0]).dew_points(&[-12.0]));
    let readings = ctl.acquire();
    assert!((readings.dew_point - -12.0).abs() < 0.05, "dp = {}", readings.dew_point);
}
