//! aeroquery - version-reconciled asynchronous queries over a
//! snapshot-isolated store
//!
//! - `mvcc`: version stamps, row version chains, visibility, retention pins
//! - `store`: the `VersionedStore` interface and the in-memory store
//! - `query`: origin contexts, dispatcher, reconciliation, retry, handover
//! - `observability`: structured logs and counters
//! - `cli`: the `aeroquery` binary

pub mod cli;
pub mod mvcc;
pub mod observability;
pub mod query;
pub mod store;
