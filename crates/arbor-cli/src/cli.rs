use std::path::PathBuf;

use arbor_lock::LockStrategy;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor: hierarchical locking for a concurrently mutated resource tree",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a random concurrent workload against an in-memory tree
    Stress(StressArgs),
    /// Print the effective locker configuration as TOML
    Config(ConfigArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StrategyArg {
    Path,
    Trivial,
}

impl From<StrategyArg> for LockStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Path => LockStrategy::Path,
            StrategyArg::Trivial => LockStrategy::Trivial,
        }
    }
}

/// Locker selection shared by every subcommand.
#[derive(Args)]
pub struct LockerArgs {
    /// Locker configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured strategy
    #[arg(long)]
    pub strategy: Option<StrategyArg>,

    /// Override the configured registry shard count
    #[arg(long)]
    pub shards: Option<usize>,
}

#[derive(Args)]
pub struct StressArgs {
    #[command(flatten)]
    pub locker: LockerArgs,

    #[arg(long, default_value_t = 8)]
    pub threads: usize,

    /// Requests per thread
    #[arg(long, default_value_t = 1000)]
    pub ops: usize,

    /// Depth of the seeded tree
    #[arg(long, default_value_t = 3)]
    pub depth: usize,

    /// Children per seeded node
    #[arg(long, default_value_t = 4)]
    pub fanout: usize,

    #[arg(long, default_value_t = 0x5eed)]
    pub seed: u64,

    /// Percent of requests that lock the whole tree
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub everything: u8,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub locker: LockerArgs,
}
