//! TrackView playback simulator CLI
//!
//! Replays publisher scenarios against the subscriber and animator on
//! virtual time.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trackview_sim::scenarios::ScenarioId;
use trackview_sim::{ScenarioResult, ScenarioRunner};

/// TrackView deterministic playback CLI
#[derive(Parser, Debug)]
#[command(name = "trackview-sim")]
#[command(about = "Run deterministic playback scenarios for TrackView", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (steady, jitter, burst, dropout, renegotiate, throttled, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Simulation duration in seconds
    #[arg(short, long, default_value = "30")]
    duration: f64,

    /// Display refresh rate in Hz
    #[arg(long, default_value = "60")]
    refresh_hz: u32,

    /// Publisher's initial update interval in milliseconds
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Jump the marker to each location instead of animating
    #[arg(long)]
    snap: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export the marker trace of a single scenario to a JSON file
    #[arg(long)]
    export: Option<String>,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string().to_lowercase()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {err}");
    }
}

fn summary_json(results: &[ScenarioResult]) -> serde_json::Value {
    let failed = results.iter().filter(|r| !r.passed).count();
    serde_json::json!({
        "total": results.len(),
        "passed": results.len() - failed,
        "failed": failed,
        "results": results.iter().map(|r| {
            serde_json::json!({
                "scenario": r.scenario.name(),
                "seed": r.seed,
                "passed": r.passed,
                "time_secs": r.final_time_secs,
                "frames": r.metrics.frames_emitted,
                "updates": r.metrics.updates_received,
                "stall_ratio": r.metrics.stall_ratio(),
                "final_distance_m": r.metrics.final_distance_m,
                "failure_reason": r.failure_reason,
            })
        }).collect::<Vec<_>>(),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("TrackView playback simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(scenario) => vec![scenario],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: steady, jitter, burst, dropout, renegotiate, throttled, all");
                return ExitCode::FAILURE;
            }
        }
    };

    if args.export.is_some() && scenarios.len() > 1 {
        eprintln!("Error: --export only supports a single scenario, not 'all'");
        return ExitCode::FAILURE;
    }

    let seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner = ScenarioRunner::new(seed)
        .with_duration(args.duration)
        .with_refresh_rate(args.refresh_hz)
        .with_interval_ms(args.interval_ms)
        .with_snap_to_location(args.snap)
        .with_trace(args.export.is_some());

    let mut results: Vec<ScenarioResult> = Vec::new();
    for scenario in &scenarios {
        let result = runner.run(*scenario).await;

        if !args.json {
            if result.passed {
                info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
            } else {
                error!(
                    "✗ {} (seed={}) FAILED: {}",
                    scenario.name(),
                    seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }

        if let (Some(path), Some(trace)) = (&args.export, &result.trace) {
            match trace.write_to_file(path) {
                Ok(()) => info!("Exported {} frames to {}", trace.frames.len(), path),
                Err(e) => error!("Failed to write export: {:?}", e),
            }
        }

        results.push(result);
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if args.json {
        match serde_json::to_string_pretty(&summary_json(&results)) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenario runs passed!", results.len());
        } else {
            error!("❌ {}/{} scenario runs failed!", failed, results.len());
            for result in results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
