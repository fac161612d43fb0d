//! CLI module for AeroQuery
//!
//! Provides command-line interface for:
//! - simulate: Run a query against a store rewritten mid-flight
//! - check-config: Validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, PolicyArg, SimulateArgs};
pub use commands::{check_config, rewrite_table, run, run_command, seeded_store, simulate, SimulationReport};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
