use miette::Diagnostic;
use thiserror::Error;

/// Service error type
///
/// Engine errors pass through unchanged so callers keep their typed
/// variants; the façade only adds the authorization failure.
#[derive(Error, Debug, Diagnostic)]
pub enum ServiceError {
    /// Typed version-control error, re-raised unchanged
    #[error(transparent)]
    #[diagnostic(transparent)]
    Version(#[from] lineage_engine::VersionError),

    /// The auth context refused the operation
    #[error("Permission denied for {user}: {reason}")]
    #[diagnostic(
        code(lineage::permission_denied),
        help("Check the acting user's access to the entity before retrying")
    )]
    PermissionDenied { user: String, reason: String },
}

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    /// Create a PermissionDenied error
    pub fn permission_denied(user: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            user: user.into(),
            reason: reason.into(),
        }
    }
}

impl From<lineage_storage::StorageError> for ServiceError {
    fn from(err: lineage_storage::StorageError) -> Self {
        Self::Version(err.into())
    }
}

impl From<lineage_core::CoreError> for ServiceError {
    fn from(err: lineage_core::CoreError) -> Self {
        Self::Version(err.into())
    }
}
