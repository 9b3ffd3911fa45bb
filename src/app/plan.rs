//! Thermal-cycling plan.
//!
//! A plan is a list of blocks, each repeating a temperature sequence a
//! number of times with a dwell at every target.  [`CyclePlan::steps`]
//! flattens it into the ramps the runner executes, choosing the overshoot
//! direction from the previous target.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `n_cycles` repetitions of `temperatures_c`, dwelling `wait_secs` at each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleBlock {
    pub n_cycles: u32,
    pub temperatures_c: Vec<f64>,
    pub wait_secs: u64,
}

/// Ordered list of cycle blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CyclePlan(pub Vec<CycleBlock>);

/// One ramp of the flattened plan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampStep {
    /// 1-based cycle number, continuous across blocks.
    pub cycle: u32,
    /// First ramp of its cycle.
    pub starts_cycle: bool,
    pub target_c: f64,
    pub overshoot_c: f64,
    pub wait_time: Duration,
    /// Target is below the previous one.
    pub cooling: bool,
}

impl RampStep {
    pub fn is_cooling(&self) -> bool {
        self.cooling
    }
}

impl CyclePlan {
    /// Total number of cycles across all blocks.
    pub fn total_cycles(&self) -> u32 {
        self.0.iter().map(|b| b.n_cycles).sum()
    }

    /// Flatten into ramp steps.
    ///
    /// Each target is compared against the previous one (the first against
    /// `start_c`): going down uses `cool_overshoot_c`, otherwise
    /// `heat_overshoot_c`.
    pub fn steps(&self, start_c: f64, heat_overshoot_c: f64, cool_overshoot_c: f64) -> Vec<RampStep> {
        let mut steps = Vec::new();
        let mut current = start_c;
        let mut cycle = 0;

        for block in &self.0 {
            for _ in 0..block.n_cycles {
                cycle += 1;
                for (i, &target) in block.temperatures_c.iter().enumerate() {
                    let cooling = target < current;
                    let overshoot_c = if cooling {
                        cool_overshoot_c
                    } else {
                        heat_overshoot_c
                    };
                    steps.push(RampStep {
                        cycle,
                        starts_cycle: i == 0,
                        target_c: target,
                        overshoot_c,
                        wait_time: Duration::from_secs(block.wait_secs),
                        cooling,
                    });
                    current = target;
                }
            }
        }
        steps
    }
}

impl Default for CyclePlan {
    /// Module QC plan: two mild cycles, then one full-range cycle.
    fn default() -> Self {
        Self(vec![
            CycleBlock {
                n_cycles: 2,
                temperatures_c: vec![-45.0, 40.0],
                wait_secs: 2 * 60,
            },
            CycleBlock {
                n_cycles: 1,
                temperatures_c: vec![-55.0, 60.0],
                wait_secs: 2 * 60,
            },
        ])
    }
}
