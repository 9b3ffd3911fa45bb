//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a subsystem against the
//! scripted bench in [`mock_hw`] or the simulated bench.  No chamber or
//! hygrometer is required.

mod mock_hw;
mod ramp_tests;
mod runner_tests;
