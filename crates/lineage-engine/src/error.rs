// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Version-control error type
#[derive(Error, Debug, Diagnostic)]
pub enum VersionError {
    /// Entity not found
    #[error("Entity not found: {entity}")]
    #[diagnostic(
        code(lineage::entity_not_found),
        help("Verify the entity type and id; the entity must be initialized before it can be versioned")
    )]
    EntityNotFound { entity: String },

    /// Snapshot not found
    #[error("Snapshot not found: {snapshot_id}")]
    #[diagnostic(
        code(lineage::snapshot_not_found),
        help("Verify the snapshot id is correct and exists in the version graph")
    )]
    SnapshotNotFound { snapshot_id: String },

    /// Fork not found
    #[error("Fork not found: {fork_id}")]
    #[diagnostic(
        code(lineage::fork_not_found),
        help("Verify the fork id is correct and exists")
    )]
    ForkNotFound { fork_id: String },

    /// Entity already initialized
    #[error("Entity already exists: {entity}")]
    #[diagnostic(
        code(lineage::entity_exists),
        help("Commit against the existing entity instead of initializing it again")
    )]
    EntityExists { entity: String },

    /// Head moved since the caller last read it (lost-update protection)
    #[error("Head conflict on {target}: expected {expected}, found {actual}")]
    #[diagnostic(
        code(lineage::head_conflict),
        help("Another commit advanced the head concurrently. Re-read the head and retry on top of it")
    )]
    HeadConflict {
        target: String,
        expected: String,
        actual: String,
    },

    /// Invalid operation
    #[error("Invalid operation: {message}")]
    #[diagnostic(code(lineage::invalid_operation), help("{suggestion}"))]
    InvalidOperation { message: String, suggestion: String },

    /// Payload validation error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] lineage_core::CoreError),

    /// Storage error
    #[error("Storage error: {0}")]
    #[diagnostic(
        code(lineage::storage_error),
        help("Check the underlying storage system")
    )]
    Storage(#[from] lineage_storage::StorageError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(lineage::internal_error),
        help("This is likely a bug. Please report it with full error details")
    )]
    Internal { message: String },
}

/// Result type for version-control operations
pub type Result<T> = std::result::Result<T, VersionError>;

impl VersionError {
    /// Create an EntityNotFound error
    pub fn entity_not_found(entity: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity: entity.into(),
        }
    }

    /// Create a SnapshotNotFound error
    pub fn snapshot_not_found(snapshot_id: impl Into<String>) -> Self {
        Self::SnapshotNotFound {
            snapshot_id: snapshot_id.into(),
        }
    }

    /// Create a ForkNotFound error
    pub fn fork_not_found(fork_id: impl Into<String>) -> Self {
        Self::ForkNotFound {
            fork_id: fork_id.into(),
        }
    }

    /// Create an EntityExists error
    pub fn entity_exists(entity: impl Into<String>) -> Self {
        Self::EntityExists {
            entity: entity.into(),
        }
    }

    /// Create a HeadConflict error
    pub fn head_conflict(
        target: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::HeadConflict {
            target: target.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an InvalidOperation error
    pub fn invalid_operation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
