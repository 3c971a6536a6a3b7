use serde::{Deserialize, Serialize};
use std::fmt;

/// EntityKey uniquely identifies a versioned entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    /// Entity type (e.g., "playlist", "minsite", "repository")
    pub entity_type: String,
    /// Entity identifier, unique within its type
    pub entity_id: String,
}

impl EntityKey {
    /// Create a new EntityKey
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Get the storage key encoding: {entity_type}/{entity_id}
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.entity_type, self.entity_id)
    }

    /// Parse a storage key back into an EntityKey
    pub fn parse(key: &str) -> Option<Self> {
        let (entity_type, entity_id) = key.split_once('/')?;
        if entity_type.is_empty() || entity_id.is_empty() {
            return None;
        }
        Some(Self::new(entity_type, entity_id))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// Kind of author recorded on a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
    Human,
    Ai,
}

/// The acting identity recorded on every snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Author identifier
    pub id: String,
    /// Whether the author is a human or an AI agent
    pub kind: AuthorKind,
}

impl Author {
    /// Create a new Author
    pub fn new(id: impl Into<String>, kind: AuthorKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Create a human Author
    pub fn human(id: impl Into<String>) -> Self {
        Self::new(id, AuthorKind::Human)
    }

    /// Create an AI Author
    pub fn ai(id: impl Into<String>) -> Self {
        Self::new(id, AuthorKind::Ai)
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key() {
        let key = EntityKey::new("playlist", "summer-mix");
        assert_eq!(key.storage_key(), "playlist/summer-mix");
    }

    #[test]
    fn test_parse_key() {
        let key = EntityKey::parse("minsite/landing-page").unwrap();
        assert_eq!(key.entity_type, "minsite");
        assert_eq!(key.entity_id, "landing-page");

        assert!(EntityKey::parse("no-separator").is_none());
        assert!(EntityKey::parse("/missing-type").is_none());
    }

    #[test]
    fn test_author_kind_serde() {
        let author = Author::ai("assistant-1");
        let json = serde_json::to_string(&author).unwrap();
        assert!(json.contains("\"ai\""));

        let back: Author = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, AuthorKind::Ai);
    }
}
