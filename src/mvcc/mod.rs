//! MVCC Domain Types
//!
//! Defines the versioning vocabulary the store and the query layer share:
//! - `VersionStamp` - Totally ordered store version
//! - `Version` - Immutable row version
//! - `VersionChain` - Version history for a row
//! - `CommitAuthority` - Version assignment at commit
//! - `Visibility` - Deterministic snapshot isolation
//! - `VisibilityFloor` / `SnapshotPin` - Snapshot retention for GC

mod commit_authority;
mod gc;
mod version;
mod version_chain;
mod version_stamp;
mod visibility;

pub use commit_authority::{CommitAuthority, CommitAuthorityError};
pub use gc::{SnapshotPin, VisibilityFloor};
pub use version::{Version, VersionPayload};
pub use version_chain::VersionChain;
pub use version_stamp::VersionStamp;
pub use visibility::{Visibility, VisibilityResult};
