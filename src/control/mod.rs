//! Closed-loop chamber control.

pub mod ramp;
