//! Lineage Core - Fundamental types for the Lineage version-control engine
//!
//! This crate provides:
//! - Entity identity and author types
//! - Payload model (ordered, identity-bearing items)
//! - Payload schema plugins and the schema registry
//! - Event types published after successful mutations
//! - Error types with miette diagnostics

pub mod error;
pub mod events;
pub mod payload;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use events::{EntityEvent, EntityEventKind};
pub use payload::{Payload, PayloadItem, PayloadSchema, SchemaRegistry};
pub use types::{Author, AuthorKind, EntityKey};

/// Serialize a value to JSON
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Serialize a value to pretty JSON
pub fn to_json_pretty<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to serialize to JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a value from JSON
pub fn from_json<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| {
        CoreError::serialization_error(
            format!("Failed to deserialize from JSON: {}", e),
            Some(Box::new(e)),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip() {
        let key = EntityKey::new("playlist", "summer-mix");

        let json = to_json(&key).unwrap();
        assert!(json.contains("summer-mix"));

        let deserialized: EntityKey = from_json(&json).unwrap();
        assert_eq!(deserialized, key);
    }
}
