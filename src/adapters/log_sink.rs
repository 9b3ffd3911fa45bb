//! Log-based notifier adapter.
//!
//! Implements [`Notifier`] by writing operator notifications to the log
//! (stderr and the run's log file).  A chat or mail adapter would implement
//! the same trait.

use log::{debug, info};

use crate::app::ports::Notifier;

/// Writes `NOTIFY | <message>` lines.  When disabled, notifications are
/// only visible at debug level.
pub struct LogNotifier {
    enabled: bool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for LogNotifier {
    fn notify(&mut self, message: &str) {
        if self.enabled {
            info!("NOTIFY | {}", message);
        } else {
            debug!("NOTIFY | {} (notifications off)", message);
        }
    }
}
