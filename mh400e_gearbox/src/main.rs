//! # MH400E Gearbox
//!
//! Runs one gear shift against the simulated gearbox plant and reports the
//! gear the sensors show afterwards.
//!
//! ```text
//! mh400e_gearbox --from 80 --gear 2000 --config gearbox.toml -v
//! ```
//!
//! Without `--config` the built-in defaults are used; with it, the file holds
//! the gearbox sections plus an optional `[plant]` section.

use clap::Parser;
use mh400e_common::config::{ConfigLoader, LogLevel};
use mh400e_gearbox::cycle::{RunnerConfig, ShiftRunner, rt_setup};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// MH400E Gearbox: gear shift controller simulation
#[derive(Parser, Debug)]
#[command(name = "mh400e_gearbox")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Non-blocking gear shift controller for the MAHO MH400E gearbox")]
struct Args {
    /// Path to the gearbox configuration TOML.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target spindle speed [rpm]; 0 selects neutral.
    #[arg(long, value_name = "RPM")]
    gear: u16,

    /// Gear the plant starts in [rpm].
    #[arg(long, value_name = "RPM", default_value_t = 0)]
    from: u16,

    /// Give up after this many cycles.
    #[arg(long, default_value_t = 100_000)]
    max_cycles: u64,

    /// Pace cycles in wall-clock time and apply RT setup.
    #[arg(long)]
    realtime: bool,

    /// CPU core to pin the cycle thread to (with --realtime).
    #[arg(long, default_value_t = 1)]
    cpu_core: usize,

    /// SCHED_FIFO priority (with --realtime).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    };
    setup_tracing(&args, config.gearbox.shared.log_level);

    info!(
        "{} v{} starting...",
        config.gearbox.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = run(&args, &config) {
        error!("FATAL: {e}");
        process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<RunnerConfig, Box<dyn std::error::Error>> {
    let config = match args.config {
        Some(ref path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    config.gearbox.validate()?;
    Ok(config)
}

fn run(args: &Args, config: &RunnerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Config OK: cycle_time={}µs, gears={}, watchdog={:?}",
        config.gearbox.timing.cycle_time_us,
        config.gearbox.gear_table()?.len(),
        config.gearbox.watchdog.max_stage_polls,
    );

    if args.realtime {
        rt_setup(args.cpu_core, args.rt_priority)?;
        info!(
            "RT setup complete (cpu_core={}, priority={})",
            args.cpu_core, args.rt_priority
        );
    }

    let mut runner = ShiftRunner::from_config(config, args.from)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    })?;

    let report = runner.run_shift(args.gear, args.max_cycles, &running, args.realtime)?;

    match report.gear {
        Some(gear) if gear.rpm == args.gear => {
            info!(rpm = gear.rpm, cycles = report.cycles, "gear engaged");
        }
        Some(gear) => warn!(
            requested = args.gear,
            engaged = gear.rpm,
            "shift finished in a different gear"
        ),
        None => warn!(requested = args.gear, "shift finished between gears"),
    }
    if report.stats.overruns > 0 {
        warn!(overruns = report.stats.overruns, "cycle overruns during shift");
    }
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::from(configured)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
