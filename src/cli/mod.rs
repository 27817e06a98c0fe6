//! CLI arguments parsing

pub mod args;

pub use args::{parse_args, CliArgs, ReplayMode};
