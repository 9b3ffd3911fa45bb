//! Unified error types for the thermocycle runner.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! cycle runner's error handling uniform.  All variants are `Copy` so they
//! can be passed through the ramp controller and the runner's shutdown
//! path without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible control-loop operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// A device command that had to succeed did not.
    Device(DeviceError),
    /// The reference sensor did not enter the accuracy window in time.
    RampTimeout { target: f64, timeout_secs: u64 },
    /// Module temperatures stayed too close to the dew point for too long.
    InterlockTimeout { timeout_secs: u64 },
    /// The operator interrupted the run.
    Interrupted,
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(e) => write!(f, "device: {e}"),
            Self::RampTimeout {
                target,
                timeout_secs,
            } => write!(
                f,
                "target temperature {target} could not be reached within {timeout_secs}s"
            ),
            Self::InterlockTimeout { timeout_secs } => write!(
                f,
                "target dew point could not be reached within {timeout_secs}s"
            ),
            Self::Interrupted => write!(f, "interrupted by operator"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Device errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// Transport-level failure talking to the instrument.
    Io(std::io::ErrorKind),
    /// The instrument answered with an error code.
    Rejected(i32),
    /// The reply could not be parsed.
    Malformed,
    /// The sensor or channel cannot be read right now.
    Unavailable,
    /// The instrument has no such command.
    Unsupported(&'static str),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(kind) => write!(f, "I/O error ({kind})"),
            Self::Rejected(code) => write!(f, "rejected with code {code}"),
            Self::Malformed => write!(f, "malformed reply"),
            Self::Unavailable => write!(f, "sensor unavailable"),
            Self::Unsupported(cmd) => write!(f, "unsupported command '{cmd}'"),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Self::Device(e)
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.kind())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
