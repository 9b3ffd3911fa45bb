//! Application core. Pure domain logic, zero I/O.
//!
//! The cycle plan, the runner that executes it, and the **port traits**
//! in [`ports`] through which every instrument, clock and sink is reached.

pub mod plan;
pub mod ports;
pub mod service;
