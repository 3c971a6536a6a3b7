// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Lineage operations
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// Payload failed the entity type's structural schema
    #[error("Schema validation failed for {entity_type}: {details}")]
    #[diagnostic(code(lineage::schema_violation), help("{help_text}"))]
    SchemaViolation {
        entity_type: String,
        details: String,
        help_text: String,
    },

    /// Duplicate item id within a payload
    #[error("Duplicate item id in payload: {item_id}")]
    #[diagnostic(
        code(lineage::duplicate_item),
        help("Item ids must be unique within a payload; assign each item a distinct stable id")
    )]
    DuplicateItem { item_id: String },

    /// Item id collides with a reserved path
    #[error("Invalid item id: {item_id}")]
    #[diagnostic(
        code(lineage::invalid_item_id),
        help("Item ids must be non-empty and must not start with '~' (reserved for synthetic paths)")
    )]
    InvalidItemId { item_id: String },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(lineage::serialization_error),
        help("Ensure the data is valid JSON and can be serialized")
    )]
    SerializationError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(lineage::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    InternalError { message: String },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a SchemaViolation error
    pub fn schema_violation(
        entity_type: impl Into<String>,
        details: impl Into<String>,
        help_text: impl Into<String>,
    ) -> Self {
        Self::SchemaViolation {
            entity_type: entity_type.into(),
            details: details.into(),
            help_text: help_text.into(),
        }
    }

    /// Create a DuplicateItem error
    pub fn duplicate_item(item_id: impl Into<String>) -> Self {
        Self::DuplicateItem {
            item_id: item_id.into(),
        }
    }

    /// Create an InvalidItemId error
    pub fn invalid_item_id(item_id: impl Into<String>) -> Self {
        Self::InvalidItemId {
            item_id: item_id.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::schema_violation(
            "playlist",
            "item 'track-9' is missing a duration",
            "Every track must carry a numeric duration field",
        );
        assert!(matches!(err, CoreError::SchemaViolation { .. }));

        let err = CoreError::duplicate_item("track-1");
        assert!(matches!(err, CoreError::DuplicateItem { .. }));
    }
}
