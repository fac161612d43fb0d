//! CLI argument definitions using clap
//!
//! Commands:
//! - aeroquery simulate [--config <path>] [--rows N] [--writes K] ...
//! - aeroquery check-config --config <path>

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::query::RetryPolicy;

/// AeroQuery - version-reconciled asynchronous queries
#[derive(Parser, Debug)]
#[command(name = "aeroquery")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one query against an in-memory store while the background hook
    /// rewrites it, and report how reconciliation ended
    Simulate(SimulateArgs),

    /// Validate a configuration file and print the effective configuration
    CheckConfig {
        /// Path to configuration file
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Rows seeded before the query is submitted
    #[arg(long, default_value_t = 10)]
    pub rows: u32,

    /// Interleaved rewrites performed by the background hook
    #[arg(long, default_value_t = 0)]
    pub writes: u32,

    /// Rows each rewrite leaves behind
    #[arg(long, default_value_t = 3)]
    pub rows_per_write: u32,

    /// Leave a random number of rows (0..=rows-per-write) on each rewrite
    #[arg(long)]
    pub random_writes: bool,

    /// Retry policy (defaults to the configuration's)
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Retries allowed by `--policy max-retry`
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Resolve mismatches by importing rows before consulting the policy
    #[arg(long)]
    pub rederive: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    NoRetry,
    MaxRetry,
    Indefinite,
}

impl SimulateArgs {
    /// The explicit policy, if one was given
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.policy.map(|policy| match policy {
            PolicyArg::NoRetry => RetryPolicy::NoRetry,
            PolicyArg::MaxRetry => RetryPolicy::MaxRetry(self.max_retries),
            PolicyArg::Indefinite => RetryPolicy::Indefinite,
        })
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
