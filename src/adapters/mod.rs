//! Concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements          | Connects to                    |
//! |----------------|---------------------|--------------------------------|
//! | `weiss`        | ClimateChamberPort  | Weiss LabEvent over TCP        |
//! | `sim`          | ClimateChamberPort  | In-process chamber model       |
//! |                | HygrometerPort      |                                |
//! |                | ClockPort           | Virtual time                   |
//! | `time`         | ClockPort           | `Instant` + `chrono::Utc`      |
//! | `data_log`     | DataLogPort         | `*_thermocycling_temps.dat`    |
//! | `config_file`  | ConfigPort          | JSON file                      |
//! | `log_sink`     | Notifier            | Log output                     |
//! | `logging`      |                     | env_logger, stderr + log file  |

pub mod config_file;
pub mod data_log;
pub mod log_sink;
pub mod logging;
pub mod sim;
pub mod time;
pub mod weiss;
