//! Climate-chamber thermal cycling with a dew-point interlock.
//!
//! Exposes the control logic and the bench adapters for the binary and for
//! integration testing.  Instruments are reached only through the port
//! traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod safety;
pub mod sensors;
