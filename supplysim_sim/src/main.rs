//! SupplySim CLI
//!
//! Run seeded supply-chain sessions headless or on a real-time timer.

mod error;
mod run;

use clap::Parser;
use error::CliError;
use run::{RunPlan, RunReport, ScheduledEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use supplysim_core::{
    DriverUpdate, EngineConfig, EngineDriver, ProcessProfile, ScenarioId, SessionExport,
    StageStatus, SupplyChainEngine, Volatility,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Supply-chain pipeline simulator
#[derive(Parser, Debug)]
#[command(name = "supplysim")]
#[command(about = "Run deterministic supply-chain pipeline sessions", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Number of consecutive seeds to run (headless only)
    #[arg(long, default_value = "1")]
    seeds: u64,

    /// Noise level (low, medium, high)
    #[arg(short = 'V', long, default_value = "medium")]
    volatility: Volatility,

    /// Ticks to advance
    #[arg(short, long, default_value = "120")]
    ticks: u64,

    /// Scenario to fire at a tick, e.g. po-cancellation@30 (repeatable)
    #[arg(short, long = "event", value_name = "SCENARIO@TICK")]
    events: Vec<ScheduledEvent>,

    /// Demand-growth driver in [0, 1]
    #[arg(long)]
    demand_growth: Option<f64>,

    /// Lead-time-variance driver in [0, 1]
    #[arg(long)]
    lead_time_variance: Option<f64>,

    /// On-time-noise driver in [0, 1]
    #[arg(long)]
    on_time_noise: Option<f64>,

    /// Baseline process profile (JSON)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Export recorded frames to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Record every n-th tick into the export
    #[arg(long, default_value = "1")]
    frame_every: u64,

    /// Drive the session on a wall-clock timer instead of ticking headless
    #[arg(long)]
    realtime: bool,

    /// Timer period in real-time mode
    #[arg(long, default_value = "3000")]
    interval_ms: u64,

    /// List scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for scripting
    #[arg(long)]
    json: bool,
}

impl Args {
    fn driver_update(&self) -> DriverUpdate {
        DriverUpdate {
            demand_growth: self.demand_growth,
            lead_time_variance: self.lead_time_variance,
            on_time_noise: self.on_time_noise,
        }
    }

    fn config(&self, seed: u64, profile: Option<&ProcessProfile>) -> EngineConfig {
        let mut config = EngineConfig::new(seed)
            .with_volatility(self.volatility)
            .with_tick_interval(Duration::from_millis(self.interval_ms.max(1)));
        if let Some(profile) = profile {
            config = config.with_profile(profile.clone());
        }
        config
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: tracing subscriber already set");
    }
}

fn base_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(42)
}

async fn run(args: Args) -> Result<Vec<RunReport>, CliError> {
    let profile = args
        .profile
        .as_ref()
        .map(ProcessProfile::from_path)
        .transpose()?;
    let plan = RunPlan::new(args.ticks, args.events.clone(), args.frame_every)?;
    let base = base_seed(args.seed);
    let seeds = if args.realtime { 1 } else { args.seeds.max(1) };
    let mut reports = Vec::new();

    for offset in 0..seeds {
        let seed = base.wrapping_add(offset);
        let mut export = args
            .export
            .as_ref()
            .map(|_| SessionExport::new(seed, args.volatility));

        let mut engine = SupplyChainEngine::new(args.config(seed, profile.as_ref()));
        engine.update_drivers(args.driver_update());

        let report = if args.realtime {
            info!("Real-time mode: one tick every {} ms", args.interval_ms);
            run::run_realtime(EngineDriver::spawn(engine), &plan, export.as_mut()).await?
        } else {
            run::run_headless(&mut engine, &plan, export.as_mut())
        };

        if let (Some(path), Some(export)) = (&args.export, export.as_mut()) {
            let path = if seeds > 1 {
                path.with_file_name(format!(
                    "{}-{}.json",
                    path.file_stem().and_then(|s| s.to_str()).unwrap_or("session"),
                    seed
                ))
            } else {
                path.clone()
            };
            run::write_export(export, &path)?;
        }

        if !args.json {
            let line = format!(
                "seed={} ticks={} overall={} worst={} coverage={:.1}% alarms={}",
                report.seed,
                report.ticks,
                report.overall_status,
                report.worst_overall,
                report.coverage_pct,
                report.alarms
            );
            if report.worst_overall >= StageStatus::Delayed {
                error!("✗ {}", line);
            } else {
                info!("✓ {}", line);
            }
        }
        reports.push(report);
    }

    Ok(reports)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_scenarios {
        for scenario in ScenarioId::all() {
            println!("{:<20} {}", scenario.name(), scenario.description());
        }
        return ExitCode::SUCCESS;
    }

    if !args.json {
        info!("SupplySim v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let json = args.json;
    match run(args).await {
        Ok(reports) => {
            if json {
                match serde_json::to_string_pretty(&reports) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        error!("{}", CliError::from(e));
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
