//! Rewards Replay CLI
//!
//! Seeds a rewards engine from a master-data CSV, replays an operations CSV
//! against it, and writes the final central balances to stdout as CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- seed.csv operations.csv > balances.csv
//! cargo run -- --mode concurrent seed.csv operations.csv > balances.csv
//! cargo run -- --mode concurrent --concurrency 8 seed.csv operations.csv > balances.csv
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` to adjust verbosity (default `info`).
//! Per-record business failures (already-claimed codes, insufficient
//! balances) are logged and counted but do not fail the replay.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (unreadable files, malformed records, seed conflicts)

use loyalty_rewards_engine::cli::{self, ReplayMode};
use loyalty_rewards_engine::io::{read_ops_file, read_seed_file, write_balances_csv};
use loyalty_rewards_engine::replay;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    // Logs to stderr so the balances report on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();

    if let Err(message) = run(&args) {
        eprintln!("Error: {}", message);
        process::exit(1);
    }
}

fn run(args: &cli::CliArgs) -> Result<(), String> {
    let seed = read_seed_file(&args.seed_file)?;
    let ops = read_ops_file(&args.ops_file)?;

    let engine = replay::build_engine(&seed).map_err(|e| e.to_string())?;

    let report = match args.mode {
        ReplayMode::Sequential => replay::replay_sequential(&engine, ops),
        ReplayMode::Concurrent => {
            let engine = Arc::new(engine);
            let runtime = tokio::runtime::Runtime::new()
                .map_err(|e| format!("failed to start runtime: {}", e))?;
            let report = runtime.block_on(replay::replay_concurrent(
                Arc::clone(&engine),
                ops,
                args.effective_concurrency(),
            ));
            // Sole holder again once the runtime is done
            return finish(
                Arc::try_unwrap(engine)
                    .map_err(|_| "replay tasks still hold the engine".to_string())?,
                report,
            );
        }
    };

    finish(engine, report)
}

fn finish(
    engine: loyalty_rewards_engine::RewardsEngine,
    report: replay::ReplayReport,
) -> Result<(), String> {
    let mut stdout = std::io::stdout();
    write_balances_csv(&engine.balances_report(), &mut stdout)?;
    eprintln!(
        "replayed {} operations: {} succeeded, {} failed",
        report.attempted, report.succeeded, report.failed
    );
    engine.shutdown();
    Ok(())
}
