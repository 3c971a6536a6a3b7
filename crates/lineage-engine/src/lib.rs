//! Lineage Engine - Generic version control for mutable entities
//!
//! This crate provides:
//! - VersionGraph: append-only snapshot store with a CAS'd head pointer
//! - DiffEngine: structured change-sets between payloads
//! - ForkManager: divergent branch lifecycle
//! - MergeEngine: three-way, all-or-nothing merge of forks
//! - RevertController: non-destructive restore of past snapshots

pub mod diff;
pub mod error;
pub mod fork;
pub mod graph;
pub mod locks;
pub mod merge;
pub mod revert;
pub mod snapshot;

// Re-export commonly used types
pub use diff::{diff, Change, ChangeOp, ChangeSet, ORDER_PATH};
pub use error::{Result, VersionError};
pub use fork::{Fork, ForkManager, ForkStatus};
pub use graph::{EntityRecord, VersionGraph};
pub use locks::MergeLocks;
pub use merge::{MergeConflict, MergeEngine, MergeOutcome, MergePolicy, MergeStatus};
pub use revert::RevertController;
pub use snapshot::{ChangeSummary, Snapshot};
