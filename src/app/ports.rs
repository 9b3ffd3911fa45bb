//! Port traits: the hexagonal boundary between the control logic and the bench.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ RampController / ThermocycleService
//! ```
//!
//! Driven adapters (climate chamber, thermohygrometers, clock, data log,
//! notifications, config file) implement these traits.  The controller and
//! the runner consume them via generics, so the control logic never touches
//! a socket or the wall clock directly.
//!
//! Instrument ports return [`DeviceError`]; what a failure *means* is decided
//! by the caller.  A failed sensor read degrades to a missing value, a failed
//! setpoint command aborts the cycle.

use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::RunConfig;
use crate::error::DeviceError;
use crate::sensors::ReadingSet;

// ───────────────────────────────────────────────────────────────
// Climate chamber port (domain ↔ chamber controller)
// ───────────────────────────────────────────────────────────────

/// Command and readback interface of a climate chamber.
pub trait ClimateChamberPort {
    /// Measured chamber air temperature (°C).
    fn temperature(&mut self) -> Result<f64, DeviceError>;

    /// Currently active temperature setpoint (°C).
    fn temperature_setpoint(&mut self) -> Result<f64, DeviceError>;

    /// Command a new temperature setpoint (°C).
    fn set_temperature(&mut self, celsius: f64) -> Result<(), DeviceError>;

    /// Put the chamber under remote (manual program) control.
    fn start_manual_mode(&mut self) -> Result<(), DeviceError>;

    /// Hand the chamber back to its local program.
    fn stop_manual_mode(&mut self) -> Result<(), DeviceError>;

    /// Switch the compressed-air dryer on or off.
    fn set_air_dryer(&mut self, on: bool) -> Result<(), DeviceError>;
}

// ───────────────────────────────────────────────────────────────
// Thermohygrometer port (bench → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port of a (multi-channel) thermohygrometer.
///
/// Single-probe instruments ignore `channel`.
pub trait HygrometerPort {
    /// Probe temperature (°C).
    fn temperature(&mut self, channel: u8) -> Result<f64, DeviceError>;

    /// Relative humidity (%).
    fn humidity(&mut self, channel: u8) -> Result<f64, DeviceError>;

    /// Dew point as computed by the instrument itself (°C).
    fn dew_point(&mut self, channel: u8) -> Result<f64, DeviceError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time, wall time and blocking sleep.
///
/// Every wait in the control loop goes through [`ClockPort::sleep`], which
/// is also where an operator interrupt surfaces as
/// [`Error::Interrupted`](crate::error::Error::Interrupted).
pub trait ClockPort {
    /// Time since the clock was created (monotonic).
    fn elapsed(&self) -> Duration;

    /// Current wall-clock time, used to stamp records.
    fn wall_clock(&self) -> DateTime<Utc>;

    /// Block for `duration`.
    fn sleep(&mut self, duration: Duration) -> crate::error::Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Data log port (domain → append-only record file)
// ───────────────────────────────────────────────────────────────

/// Append-only sink for per-tick reading records.
pub trait DataLogPort {
    /// Write the column header.  Called once before the first record.
    fn begin(&mut self, columns: &[&str]) -> io::Result<()>;

    /// Append one record.
    fn record(&mut self, readings: &ReadingSet) -> io::Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Notification port (domain → operator side channel)
// ───────────────────────────────────────────────────────────────

/// Outbound operator notifications (run started, failed, finished).
///
/// Delivery is best effort; implementations log their own failures.
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the run configuration.
///
/// Implementations MUST validate before persisting.  Invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not silently clamped.
pub trait ConfigPort {
    /// Load the configuration.
    /// Returns [`ConfigError::NotFound`] if nothing is stored yet.
    fn load(&self) -> Result<RunConfig, ConfigError>;

    /// Validate and persist the configuration.
    fn save(&self, config: &RunConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage.
    NotFound,
    /// Stored config failed to deserialize.
    Corrupted(String),
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError(io::ErrorKind),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError(kind) => write!(f, "I/O error ({})", kind),
        }
    }
}

impl std::error::Error for ConfigError {}
