//! CLI command implementations
//!
//! `simulate` seeds an in-memory store, submits one range query and lets
//! the background hook rewrite the table a fixed number of times. The
//! report shows whether the query converged under the chosen policy.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use serde_json::json;

use crate::mvcc::VersionStamp;
use crate::observability::Logger;
use crate::query::{
    AsyncQueryConfig, BackgroundCompletion, Dispatcher, OriginContext, QueryError, ReconcileMode,
    RetryPolicy,
};
use crate::store::{FieldType, MemoryStore, Predicate, StoreResult, TableSchema, VersionedStore};

use super::args::{Cli, Command, SimulateArgs};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Outcome of `aeroquery simulate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    /// "converged" or "failed"
    pub outcome: &'static str,
    /// Rows delivered on convergence
    pub rows: Option<usize>,
    /// Attempts handed to workers
    pub attempts: u64,
    /// Store version at the end of the run
    pub version: VersionStamp,
    pub error_code: Option<&'static str>,
}

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Simulate(args) => {
            let report = simulate(&args)?;
            write_response(serde_json::to_value(&report)?)
        }
        Command::CheckConfig { config } => check_config(&config),
    }
}

/// Validate a configuration file and print the effective values
pub fn check_config(config_path: &Path) -> CliResult<()> {
    match AsyncQueryConfig::from_json_file(config_path) {
        Ok(config) => write_response(serde_json::to_value(&config)?),
        Err(e) => {
            let err = CliError::from(e);
            write_error(err.code_str(), err.message())?;
            Err(err)
        }
    }
}

/// Run one simulation on a fresh current-thread runtime
pub fn simulate(args: &SimulateArgs) -> CliResult<SimulationReport> {
    let mut config = match &args.config {
        Some(path) => AsyncQueryConfig::from_json_file(path)?,
        None => AsyncQueryConfig::default(),
    };
    config.apply_logging();
    if args.rederive {
        config.reconcile_mode = ReconcileMode::Rederive;
    }
    config.simulation.max_background_hook_runs = Some(args.writes);
    let policy = args.retry_policy().unwrap_or(config.default_retry_policy);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_simulation(config, policy, args))
}

async fn run_simulation(
    config: AsyncQueryConfig,
    policy: RetryPolicy,
    args: &SimulateArgs,
) -> CliResult<SimulationReport> {
    let store = Arc::new(seeded_store(args.rows)?);
    let dispatcher = Arc::new(Dispatcher::from_current(&config)?);
    let mut origin = OriginContext::new(store.clone(), dispatcher, config);

    let delivered: Rc<RefCell<Option<Result<usize, QueryError>>>> = Rc::new(RefCell::new(None));
    let on_success = Rc::clone(&delivered);
    let on_error = Rc::clone(&delivered);

    let writer = Arc::clone(&store);
    let rows_per_write = args.rows_per_write;
    let random_writes = args.random_writes;

    origin
        .query(Predicate::all().between("column_long", json!(0), json!(9)))
        .retry_policy(policy)
        .on_background_completed(move |done: &BackgroundCompletion| {
            let rows = if random_writes {
                rand::thread_rng().gen_range(0..=rows_per_write)
            } else {
                rows_per_write
            };
            if let Err(e) = rewrite_table(&writer, rows) {
                Logger::warn(
                    "SIMULATION_WRITE_FAILED",
                    &[
                        ("attempt", done.attempt.to_string().as_str()),
                        ("error", e.to_string().as_str()),
                    ],
                );
            }
        })
        .find_all(
            move |view| *on_success.borrow_mut() = Some(Ok(view.len())),
            move |err| *on_error.borrow_mut() = Some(Err(err)),
        );

    origin.run_until_idle().await;

    let attempts = origin.metrics().snapshot().attempts;
    let version = store.current_version();
    let report = match delivered.borrow_mut().take() {
        Some(Ok(rows)) => SimulationReport {
            outcome: "converged",
            rows: Some(rows),
            attempts,
            version,
            error_code: None,
        },
        Some(Err(e)) => SimulationReport {
            outcome: "failed",
            rows: None,
            attempts,
            version,
            error_code: Some(e.code()),
        },
        None => return Err(CliError::simulation_failed("query finished without a result")),
    };
    Ok(report)
}

fn simulation_schema() -> TableSchema {
    TableSchema::new("all_types")
        .field("column_long", FieldType::Int)
        .field("column_string", FieldType::String)
}

/// Store with `rows` rows numbered from 0
pub fn seeded_store(rows: u32) -> StoreResult<MemoryStore> {
    let store = MemoryStore::new(simulation_schema());
    rewrite_table(&store, rows)?;
    Ok(store)
}

/// Replace the table contents with `rows` fresh rows in one commit
pub fn rewrite_table(store: &MemoryStore, rows: u32) -> StoreResult<VersionStamp> {
    store.write(|txn| {
        txn.clear();
        for i in 0..rows {
            txn.insert(json!({
                "column_long": i,
                "column_string": format!("test data {}", i),
            }))?;
        }
        Ok(())
    })
}
