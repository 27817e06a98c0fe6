use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Replay loyalty scan/credit/redeem operations against a seeded engine
#[derive(Parser, Debug)]
#[command(name = "rewards-replay")]
#[command(
    about = "Replay loyalty operations against a seeded rewards engine",
    long_about = None
)]
pub struct CliArgs {
    /// Seed CSV describing master data (participants, QR codes, configs)
    #[arg(value_name = "SEED", help = "Path to the seed CSV file")]
    pub seed_file: PathBuf,

    /// Operations CSV of scan/credit/redeem records
    #[arg(value_name = "OPERATIONS", help = "Path to the operations CSV file")]
    pub ops_file: PathBuf,

    /// Replay mode
    #[arg(
        long = "mode",
        value_name = "MODE",
        default_value = "sequential",
        help = "Replay mode: 'sequential' preserves record order, 'concurrent' batches records into parallel tasks"
    )]
    pub mode: ReplayMode,

    /// Batch size for concurrent mode (default: CPU cores)
    #[arg(
        long = "concurrency",
        value_name = "COUNT",
        help = "Records dispatched per concurrent batch (default: CPU cores)"
    )]
    pub concurrency: Option<usize>,
}

/// Available replay modes
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReplayMode {
    Sequential,
    Concurrent,
}

impl CliArgs {
    /// Effective batch size for concurrent mode
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Parse command-line arguments
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
