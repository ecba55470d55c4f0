//! # ECU Control Unit
//!
//! Runs the spark/fuel control core against the simulation drivers: a
//! missing-tooth wheel following a speed profile, a virtual one-shot timer
//! per channel and logged output pins. Prints a run summary on exit.

use clap::Parser;
use ecu_common::config::LogLevel;
use ecu_common::engine::error::SkipReason;
use ecu_control_unit::config::{LoadedConfig, load_config};
use ecu_control_unit::runner::{CycleRunner, DEFAULT_POLL_INTERVAL_US};
use ecu_hal::{SimSensors, SpeedProfile};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// ECU Control Unit: simulated spark and fuel control
#[derive(Parser, Debug)]
#[command(name = "ecu_control_unit")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Crank-synchronous spark and fuel scheduling on a virtual clock")]
struct Args {
    /// Path to the ECU configuration TOML.
    #[arg(default_value = "config/ecu.toml")]
    config: PathBuf,

    /// Crank speed at start [rpm].
    #[arg(long, default_value_t = 3000.0)]
    rpm: f64,

    /// Ramp linearly to this speed over the whole run [rpm].
    #[arg(long)]
    ramp_to: Option<f64>,

    /// Simulated duration [ms].
    #[arg(long, default_value_t = 1000)]
    duration_ms: u64,

    /// Manifold absolute pressure reported by the sensor [kPa].
    #[arg(long, default_value_t = 101.3)]
    map_kpa: f64,

    /// Main-loop poll interval [µs].
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_US)]
    poll_us: u64,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let loaded = load_config(&args.config);
    setup_tracing(&args, loaded.as_ref().ok().map(|l| l.config.shared.log_level));

    info!("ECU Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = loaded
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error>)
        .and_then(|loaded| run(&args, &loaded));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("ECU Control Unit shutdown complete");
}

fn run(args: &Args, loaded: &LoadedConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = &loaded.config;
    info!(
        "Config OK: service={}, wheel={}-{}, dwell={}µs, rev limit={}/{} rpm",
        config.shared.service_name,
        config.crank.tooth_positions,
        config.crank.missing_teeth,
        config.engine.dwell_us,
        config.limits.upper_rev_limit_rpm,
        config.limits.lower_rev_limit_rpm,
    );

    let duration_us = args.duration_ms.saturating_mul(1_000);
    let profile = match args.ramp_to {
        Some(end_rpm) => SpeedProfile::ramp(args.rpm, end_rpm, duration_us),
        None => SpeedProfile::constant(args.rpm),
    };
    let sensors = SimSensors::new().with_map_kpa(args.map_kpa);

    let mut runner = CycleRunner::new(loaded, sensors, profile, args.poll_us)?;
    info!(
        "Simulating {} ms from {} rpm{}",
        args.duration_ms,
        args.rpm,
        args.ramp_to.map(|r| format!(" to {r} rpm")).unwrap_or_default()
    );
    let report = runner.run_until(duration_us);

    info!(
        "Revolutions={} sparks={} injections={} state={:?}",
        report.revolutions.len(),
        report.counters.sparks,
        report.counters.injections,
        report.final_state,
    );
    for (name, reason) in SkipReason::all().iter_names() {
        let count = report.skipped(reason);
        if count > 0 {
            info!("  skipped {name}: {count}");
        }
    }
    if report.rev_limit_engagements > 0 {
        info!("Rev limiter engaged {} times", report.rev_limit_engagements);
    }
    if report.cycle_stats.stalls > 0 {
        warn!("Crank stalled {} times", report.cycle_stats.stalls);
    }
    if report.counters.chain_failures > 0 {
        warn!("{} follow-up actions refused by the timer", report.counters.chain_failures);
    }
    if let Some(fault) = &report.last_fault {
        return Err(format!("control latched in fault: {fault}").into());
    }
    Ok(())
}

fn setup_tracing(args: &Args, configured: Option<LogLevel>) {
    let level = if args.verbose {
        LogLevel::Debug
    } else {
        configured.unwrap_or_default()
    };

    // RUST_LOG overrides the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));

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
