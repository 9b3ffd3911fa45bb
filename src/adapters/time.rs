//! Host time adapter.
//!
//! - Monotonic elapsed time from `std::time::Instant`.
//! - Wall time from `chrono::Utc`, used to stamp records.
//! - Sleeps are sliced so an operator interrupt (Ctrl-C sets the shared
//!   flag) is noticed within one slice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::app::ports::ClockPort;
use crate::error::{Error, Result};

/// Longest uninterrupted sleep.
const SLICE: Duration = Duration::from_millis(100);

pub struct SystemClock {
    start: Instant,
    interrupt: Arc<AtomicBool>,
}

impl SystemClock {
    pub fn new(interrupt: Arc<AtomicBool>) -> Self {
        Self {
            start: Instant::now(),
            interrupt,
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }
}

impl ClockPort for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&mut self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            if self.interrupted() {
                return Err(Error::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }
}
