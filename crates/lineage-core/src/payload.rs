use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A single identity-bearing item within a payload
///
/// The id is the item's stable identity across snapshots (e.g., a track id or
/// a page-component id) and is the unit of diff and merge addressing. The
/// granularity is the caller's choice: a playlist may model every track as an
/// item, or model the whole track list as one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadItem {
    /// Stable item identity, unique within the payload
    pub id: String,
    /// Item content
    pub value: Value,
}

impl PayloadItem {
    /// Create a new PayloadItem
    pub fn new(id: impl Into<String>, value: Value) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }
}

/// An ordered collection of identity-bearing items, tagged with its entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Entity type this payload conforms to
    pub entity_type: String,
    /// Ordered items
    pub items: Vec<PayloadItem>,
}

impl Payload {
    /// Create an empty payload for an entity type
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            items: Vec::new(),
        }
    }

    /// Create a payload from a list of items
    pub fn with_items(entity_type: impl Into<String>, items: Vec<PayloadItem>) -> Self {
        Self {
            entity_type: entity_type.into(),
            items,
        }
    }

    /// Append an item, builder style
    pub fn item(mut self, id: impl Into<String>, value: Value) -> Self {
        self.items.push(PayloadItem::new(id, value));
        self
    }

    /// Look up an item by id
    pub fn get(&self, id: &str) -> Option<&PayloadItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// The item ids in payload order
    pub fn item_ids(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.id.as_str()).collect()
    }

    /// Check the structural invariants every payload must satisfy:
    /// item ids are non-empty, unique, and do not use the reserved '~' prefix
    pub fn check_structure(&self) -> Result<()> {
        let mut seen = HashMap::with_capacity(self.items.len());
        for item in &self.items {
            if item.id.is_empty() || item.id.starts_with('~') {
                return Err(CoreError::invalid_item_id(&item.id));
            }
            if seen.insert(item.id.as_str(), ()).is_some() {
                return Err(CoreError::duplicate_item(&item.id));
            }
        }
        Ok(())
    }
}

/// Entity-type payload schema plugin
///
/// Implementations describe the structural rules for one entity type's
/// payloads. Registered schemas are checked at commit time; a payload that
/// fails validation is rejected before any state change.
pub trait PayloadSchema: Send + Sync {
    /// The entity type this schema validates
    fn entity_type(&self) -> &str;

    /// Validate a payload against the schema
    fn validate(&self, payload: &Payload) -> Result<()>;
}

/// Registry of payload schemas keyed by entity type
///
/// Entity types without a registered schema are checked against the
/// structural invariants only.
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<dyn PayloadSchema>>,
}

impl SchemaRegistry {
    /// Create an empty SchemaRegistry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema for its entity type, replacing any previous one
    pub fn register(&mut self, schema: Arc<dyn PayloadSchema>) {
        self.schemas
            .insert(schema.entity_type().to_string(), schema);
    }

    /// Whether a schema is registered for the entity type
    pub fn contains(&self, entity_type: &str) -> bool {
        self.schemas.contains_key(entity_type)
    }

    /// Validate a payload: structural invariants first, then the entity
    /// type's registered schema if there is one
    pub fn validate(&self, payload: &Payload) -> Result<()> {
        payload.check_structure()?;
        if let Some(schema) = self.schemas.get(&payload.entity_type) {
            schema.validate(payload)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("entity_types", &self.schemas.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct TrackSchema;

    impl PayloadSchema for TrackSchema {
        fn entity_type(&self) -> &str {
            "playlist"
        }

        fn validate(&self, payload: &Payload) -> Result<()> {
            for item in &payload.items {
                if !item.value.is_object() {
                    return Err(CoreError::schema_violation(
                        "playlist",
                        format!("item '{}' is not an object", item.id),
                        "Playlist items must be JSON objects",
                    ));
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_check_structure_rejects_duplicates() {
        let payload = Payload::new("playlist")
            .item("track-1", json!({"title": "a"}))
            .item("track-1", json!({"title": "b"}));

        let err = payload.check_structure().unwrap_err();
        assert!(matches!(err, CoreError::DuplicateItem { .. }));
    }

    #[test]
    fn test_check_structure_rejects_reserved_ids() {
        let payload = Payload::new("playlist").item("~order", json!([]));
        let err = payload.check_structure().unwrap_err();
        assert!(matches!(err, CoreError::InvalidItemId { .. }));

        let payload = Payload::new("playlist").item("", json!(null));
        assert!(payload.check_structure().is_err());
    }

    #[test]
    fn test_registry_validates_registered_type() {
        let mut registry = SchemaRegistry::new();
        registry.register(Arc::new(TrackSchema));

        let good = Payload::new("playlist").item("track-1", json!({"title": "a"}));
        assert!(registry.validate(&good).is_ok());

        let bad = Payload::new("playlist").item("track-1", json!("not-an-object"));
        let err = registry.validate(&bad).unwrap_err();
        assert!(matches!(err, CoreError::SchemaViolation { .. }));
    }

    #[test]
    fn test_registry_passes_unregistered_type() {
        let registry = SchemaRegistry::new();
        let payload = Payload::new("minsite").item("hero", json!("anything goes"));
        assert!(registry.validate(&payload).is_ok());
    }

    #[test]
    fn test_item_lookup_and_order() {
        let payload = Payload::new("playlist")
            .item("a", json!(1))
            .item("b", json!(2));

        assert_eq!(payload.item_ids(), vec!["a", "b"]);
        assert_eq!(payload.get("b").unwrap().value, json!(2));
        assert!(payload.get("c").is_none());
    }
}
