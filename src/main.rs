//! Thermal cycling runner, main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  WeissLabEvent / SimChamber   SimHygrometer   SystemClock    │
//! │  (ClimateChamberPort)         (Hygrometer)    (ClockPort)    │
//! │  CsvDataLog   LogNotifier   JsonConfigFile                   │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │  ThermocycleService ─▶ RampController ─▶ Interlock     │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `thermocycle [CONFIG.json] [--simulate] [--print-default-config]`
#![deny(unused_must_use)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use chrono::{Local, Utc};
use log::{error, info, warn};

use thermocycle::adapters::config_file::JsonConfigFile;
use thermocycle::adapters::data_log::CsvDataLog;
use thermocycle::adapters::log_sink::LogNotifier;
use thermocycle::adapters::sim::{self, SimClock, SimConfig, SimEnvironment};
use thermocycle::adapters::time::SystemClock;
use thermocycle::adapters::weiss::WeissLabEvent;
use thermocycle::adapters::logging;
use thermocycle::app::ports::{
    ClimateChamberPort, ClockPort, ConfigError, ConfigPort, DataLogPort, HygrometerPort,
};
use thermocycle::app::service::ThermocycleService;
use thermocycle::config::{Backend, RunConfig};
use thermocycle::control::ramp::{Bench, RampController};
use thermocycle::error::DeviceError;

// ── Command line ──────────────────────────────────────────────

const USAGE: &str = "usage: thermocycle [CONFIG.json] [--simulate] [--print-default-config]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    simulate: bool,
    print_default_config: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--simulate" => args.simulate = true,
            "--print-default-config" => args.print_default_config = true,
            "-h" | "--help" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            s if s.starts_with('-') => bail!("unknown option '{s}'\n{USAGE}"),
            path => {
                if args.config.replace(PathBuf::from(path)).is_some() {
                    bail!("more than one config file given\n{USAGE}");
                }
            }
        }
    }
    Ok(args)
}

// ── Bench without hygrometers ─────────────────────────────────

/// Hygrometer type of a bench that has none attached.
enum NoHygrometer {}

impl HygrometerPort for NoHygrometer {
    fn temperature(&mut self, _channel: u8) -> Result<f64, DeviceError> {
        match *self {}
    }
    fn humidity(&mut self, _channel: u8) -> Result<f64, DeviceError> {
        match *self {}
    }
    fn dew_point(&mut self, _channel: u8) -> Result<f64, DeviceError> {
        match *self {}
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    let args = parse_args()?;

    if args.print_default_config {
        println!("{}", serde_json::to_string_pretty(&RunConfig::default())?);
        return Ok(());
    }

    // ── 1. Load config (or defaults) ──────────────────────────
    let loaded = args
        .config
        .as_ref()
        .map(|path| (path, JsonConfigFile::new(path).load()));
    let mut config = match &loaded {
        Some((_, Ok(cfg))) => cfg.clone(),
        Some((_, Err(ConfigError::NotFound))) | None => RunConfig::default(),
        Some((path, Err(e))) => bail!("config {} could not be loaded: {}", path.display(), e),
    };
    if args.simulate && !matches!(config.backend, Backend::Simulated(_)) {
        config.backend = Backend::Simulated(SimConfig::default());
    }
    config.validate().context("invalid configuration")?;

    // ── 2. Output files + logging ─────────────────────────────
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("creating {}", config.output_dir.display()))?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let log_path = config.output_dir.join(format!("{stamp}_thermocycling.log"));
    let data_path = config.output_dir.join(format!("{stamp}_thermocycling_temps.dat"));
    logging::init(Some(&log_path))?;

    info!("thermocycle v{}", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Some((path, Ok(_))) => info!("Config loaded from {}", path.display()),
        Some((path, Err(_))) => warn!("Config {} not found, using defaults", path.display()),
        None => info!("No config given, using defaults"),
    }
    info!("Writing data to {}", data_path.display());

    // ── 3. Operator interrupt ─────────────────────────────────
    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupt);
        ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
            .context("installing interrupt handler")?;
    }

    let data_log = CsvDataLog::create(&data_path)
        .with_context(|| format!("creating {}", data_path.display()))?;

    // ── 4. Bench ──────────────────────────────────────────────
    let outcome = match &config.backend {
        Backend::Simulated(sim_config) => {
            info!("Bench: simulated chamber");
            let env = SimEnvironment::shared(sim_config.clone());
            let bench = sim::bench(&env);
            let clock = SimClock::new(env, Utc::now()).with_interrupt(Arc::clone(&interrupt));
            execute(&config, bench, clock, data_log)
        }
        Backend::Weiss {
            address,
            port,
            device_id,
        } => {
            info!("Bench: Weiss LabEvent at {}:{} (device {})", address, port, device_id);
            let chamber = WeissLabEvent::connect(address, *port, *device_id)
                .with_context(|| format!("connecting to {address}:{port}"))?;
            let bench: Bench<_, NoHygrometer> = Bench::new(chamber);
            execute(&config, bench, SystemClock::new(Arc::clone(&interrupt)), data_log)
        }
    };

    if let Err(e) = &outcome {
        error!("Run failed: {:#}", e);
    }
    outcome
}

fn execute<C, H, K, L>(config: &RunConfig, bench: Bench<C, H>, clock: K, data_log: L) -> Result<()>
where
    C: ClimateChamberPort,
    H: HygrometerPort,
    K: ClockPort,
    L: DataLogPort,
{
    let mut controller = RampController::from_config(config, bench, clock, data_log);
    let service = ThermocycleService::new(config.clone());
    let mut notifier = LogNotifier::new(config.notify);

    info!(
        "Plan: {} cycles in {} steps",
        config.cycles.total_cycles(),
        service.steps().len()
    );
    let summary = service.run(&mut controller, &mut notifier)?;
    info!(
        "Run finished: {} cycles, {:.0}s",
        summary.cycles_completed,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}
