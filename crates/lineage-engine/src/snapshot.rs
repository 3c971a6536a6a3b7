use chrono::{DateTime, Utc};
use lineage_core::{Author, EntityKey, Payload};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Counts of changes between a snapshot and its parent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub reordered: usize,
}

impl ChangeSummary {
    /// True when the snapshot is identical to its parent
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0 && self.reordered == 0
    }
}

/// An immutable recorded state of an entity at one point in its history
///
/// Snapshots are only ever created by commit, revert, or merge; they are
/// never mutated or deleted. `parent` is None only for an entity's root
/// snapshot; `fork_id` is None for main-line snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique snapshot id (UUID)
    pub id: String,
    /// Entity this snapshot belongs to
    pub entity: EntityKey,
    /// Parent snapshot id; None only for the root
    pub parent: Option<String>,
    /// Fork this snapshot was committed on; None means the main line
    pub fork_id: Option<String>,
    /// Who created the snapshot
    pub author: Author,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// The full entity state at this point
    pub payload: Payload,
    /// Change counts against the parent snapshot
    pub summary: ChangeSummary,
    /// Fork this snapshot merged in, for merge snapshots
    ///
    /// History stays a single-parent chain; the merged fork's provenance is
    /// recorded here rather than as a second parent.
    pub merged_from: Option<String>,
}

impl Snapshot {
    /// Create a new snapshot record
    pub(crate) fn new(
        entity: EntityKey,
        parent: Option<String>,
        fork_id: Option<String>,
        author: Author,
        payload: Payload,
        summary: ChangeSummary,
        merged_from: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entity,
            parent,
            fork_id,
            author,
            timestamp: Utc::now(),
            payload,
            summary,
            merged_from,
        }
    }

    /// Check if this is the entity's root snapshot
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Check if this snapshot was produced by a merge
    pub fn is_merge(&self) -> bool {
        self.merged_from.is_some()
    }

    /// Check if this snapshot lives on a fork
    pub fn is_fork_snapshot(&self) -> bool {
        self.fork_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_snapshot() {
        let payload = Payload::new("playlist").item("track-1", json!({"title": "a"}));
        let snapshot = Snapshot::new(
            EntityKey::new("playlist", "mix"),
            None,
            None,
            Author::human("alice"),
            payload,
            ChangeSummary::default(),
            None,
        );

        assert!(!snapshot.id.is_empty());
        assert!(snapshot.is_root());
        assert!(!snapshot.is_merge());
        assert!(!snapshot.is_fork_snapshot());
        assert!(snapshot.summary.is_empty());
    }

    #[test]
    fn test_snapshot_serde_roundtrip() {
        let snapshot = Snapshot::new(
            EntityKey::new("minsite", "landing"),
            Some("parent-id".to_string()),
            Some("fork-id".to_string()),
            Author::ai("assistant"),
            Payload::new("minsite"),
            ChangeSummary {
                added: 1,
                ..Default::default()
            },
            None,
        );

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, snapshot.id);
        assert_eq!(back.parent.as_deref(), Some("parent-id"));
        assert!(back.is_fork_snapshot());
        assert_eq!(back.summary.added, 1);
    }
}
