use crate::diff::diff;
use crate::error::{Result, VersionError};
use crate::graph::VersionGraph;
use crate::snapshot::{ChangeSummary, Snapshot};
use chrono::{DateTime, Utc};
use lineage_core::{Author, EntityKey, Payload};
use lineage_storage::{KVStore, KeyEncoder, StorageError, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Lifecycle state of a fork
///
/// Active forks accept commits and merges. Merged and Abandoned are
/// terminal: a fork in either state accepts nothing further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForkStatus {
    Active,
    Merged,
    Abandoned,
}

impl std::fmt::Display for ForkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ForkStatus::Active => "Active",
            ForkStatus::Merged => "Merged",
            ForkStatus::Abandoned => "Abandoned",
        };
        write!(f, "{}", s)
    }
}

/// A divergent line of snapshots rooted at a main-line ancestor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fork {
    /// Unique fork id (UUID)
    pub id: String,
    /// Entity the fork diverged from
    pub origin: EntityKey,
    /// The exact main-line snapshot the fork diverged at
    pub origin_snapshot: String,
    /// Fork owner
    pub owner: String,
    /// Current fork head snapshot id
    pub head: String,
    /// Lifecycle state
    pub status: ForkStatus,
    /// Cumulative change counts of the fork head against the origin snapshot
    pub stats: ChangeSummary,
    /// When the fork was created
    pub created_at: DateTime<Utc>,
}

impl Fork {
    /// Check whether the fork still accepts commits and merges
    pub fn is_active(&self) -> bool {
        self.status == ForkStatus::Active
    }
}

/// Creates and tracks divergent branches of an entity
#[derive(Clone)]
pub struct ForkManager {
    storage: Arc<dyn KVStore>,
    graph: VersionGraph,
}

impl ForkManager {
    /// Create a new ForkManager sharing the graph's storage
    pub fn new(storage: Arc<dyn KVStore>, graph: VersionGraph) -> Self {
        Self { storage, graph }
    }

    /// The storage backend, shared with the merge path
    pub(crate) fn storage(&self) -> &Arc<dyn KVStore> {
        &self.storage
    }

    /// Create a fork of an entity at a main-line snapshot
    ///
    /// The fork's head starts at the origin snapshot. Forking at a snapshot
    /// that is not on the entity's main line is an InvalidOperation.
    pub fn create(
        &self,
        entity: &EntityKey,
        at_snapshot: &str,
        owner: impl Into<String>,
    ) -> Result<Fork> {
        if !self.graph.on_main_line(entity, at_snapshot)? {
            // Also distinguishes a missing snapshot from a foreign one
            let _ = self.graph.get(at_snapshot)?;
            return Err(VersionError::invalid_operation(
                format!("snapshot {} is not in the main-line history of {}", at_snapshot, entity),
                "Forks can only diverge from a snapshot on the entity's own main line",
            ));
        }

        let fork = Fork {
            id: Uuid::new_v4().to_string(),
            origin: entity.clone(),
            origin_snapshot: at_snapshot.to_string(),
            owner: owner.into(),
            head: at_snapshot.to_string(),
            status: ForkStatus::Active,
            stats: ChangeSummary::default(),
            created_at: Utc::now(),
        };

        let mut txn = self.storage.transaction()?;
        Self::store_fork_in(&mut *txn, &fork)?;
        let index_key = KeyEncoder::fork_index_key(entity, &fork.id);
        txn.put(index_key.as_bytes(), fork.id.as_bytes())?;
        txn.commit()?;

        info!("Created fork {} of {} at {}", fork.id, entity, at_snapshot);
        Ok(fork)
    }

    /// Get a fork by id
    pub fn get(&self, fork_id: &str) -> Result<Fork> {
        let key = KeyEncoder::fork_key(fork_id);
        Self::decode_fork(fork_id, self.storage.get(key.as_bytes())?)
    }

    /// List all forks of an entity, via the fork index
    pub fn list(&self, entity: &EntityKey) -> Result<Vec<Fork>> {
        let prefix = KeyEncoder::fork_index_prefix(entity);
        let entries = self.storage.scan_prefix(prefix.as_bytes())?;

        let mut forks = Vec::with_capacity(entries.len());
        for (_, fork_id) in entries {
            forks.push(self.get(&String::from_utf8_lossy(&fork_id))?);
        }
        Ok(forks)
    }

    /// Commit a new snapshot on a fork
    ///
    /// Chains from the fork's own head under the same compare-and-swap
    /// discipline as main-line commits; the main entity's head is never
    /// touched. Only Active forks accept commits.
    pub fn commit(
        &self,
        fork_id: &str,
        payload: Payload,
        author: Author,
        expected_parent: &str,
    ) -> Result<Snapshot> {
        let mut txn = self.storage.transaction()?;

        let mut fork = Self::fork_in(&*txn, fork_id)?;
        if !fork.is_active() {
            return Err(VersionError::invalid_operation(
                format!("fork {} is {}", fork.id, fork.status),
                "Only Active forks accept commits",
            ));
        }
        self.graph.check_payload(&fork.origin, &payload)?;

        if fork.head != expected_parent {
            debug!(
                "Fork head conflict on {}: expected {}, actual {}",
                fork.id, expected_parent, fork.head
            );
            return Err(VersionError::head_conflict(
                format!("fork {}", fork.id),
                expected_parent,
                fork.head,
            ));
        }

        let parent = VersionGraph::snapshot_in(&*txn, &fork.head)?;
        let summary = diff(&parent.payload, &payload).summary();

        let snapshot = Snapshot::new(
            fork.origin.clone(),
            Some(fork.head.clone()),
            Some(fork.id.clone()),
            author,
            payload,
            summary,
            None,
        );
        VersionGraph::store_snapshot_in(&mut *txn, &snapshot)?;

        // Refresh cumulative stats against the origin snapshot
        let origin = VersionGraph::snapshot_in(&*txn, &fork.origin_snapshot)?;
        fork.stats = diff(&origin.payload, &snapshot.payload).summary();
        fork.head = snapshot.id.clone();
        Self::store_fork_in(&mut *txn, &fork)?;

        txn.commit()?;

        info!("Committed {} on fork {}", snapshot.id, fork.id);
        Ok(snapshot)
    }

    /// Abandon a fork
    ///
    /// Terminal: an abandoned fork accepts no further commits or merges.
    pub fn abandon(&self, fork_id: &str) -> Result<Fork> {
        let mut txn = self.storage.transaction()?;

        let mut fork = Self::fork_in(&*txn, fork_id)?;
        if !fork.is_active() {
            return Err(VersionError::invalid_operation(
                format!("fork {} is {}", fork.id, fork.status),
                "Only Active forks can be abandoned",
            ));
        }

        fork.status = ForkStatus::Abandoned;
        Self::store_fork_in(&mut *txn, &fork)?;
        txn.commit()?;

        info!("Abandoned fork {}", fork.id);
        Ok(fork)
    }

    /// Load a fork through an open transaction
    pub(crate) fn fork_in(txn: &dyn Transaction, fork_id: &str) -> Result<Fork> {
        let key = KeyEncoder::fork_key(fork_id);
        Self::decode_fork(fork_id, txn.get(key.as_bytes())?)
    }

    /// Write a fork record through an open transaction
    pub(crate) fn store_fork_in(txn: &mut dyn Transaction, fork: &Fork) -> Result<()> {
        let bytes = serde_json::to_vec(fork).map_err(StorageError::from)?;
        let key = KeyEncoder::fork_key(&fork.id);
        txn.put(key.as_bytes(), &bytes)?;
        Ok(())
    }

    fn decode_fork(fork_id: &str, bytes: Option<bytes::Bytes>) -> Result<Fork> {
        match bytes {
            Some(bytes) => Ok(serde_json::from_slice(&bytes).map_err(StorageError::from)?),
            None => Err(VersionError::fork_not_found(fork_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::SchemaRegistry;
    use lineage_storage::RedbBackend;
    use serde_json::json;
    use tempfile::tempdir;

    fn make_managers() -> (tempfile::TempDir, VersionGraph, ForkManager) {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn KVStore> =
            Arc::new(RedbBackend::new(dir.path().join("test.redb")).unwrap());
        let graph = VersionGraph::new(backend.clone(), Arc::new(SchemaRegistry::new()));
        let forks = ForkManager::new(backend, graph.clone());
        (dir, graph, forks)
    }

    fn tracks(ids: &[&str]) -> Payload {
        let mut payload = Payload::new("playlist");
        for id in ids {
            payload = payload.item(*id, json!({ "title": id }));
        }
        payload
    }

    #[test]
    fn test_create_fork_at_head() {
        let (_dir, graph, forks) = make_managers();
        let entity = EntityKey::new("playlist", "mix");
        let root = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap();

        let fork = forks.create(&entity, &root.id, "bob").unwrap();
        assert_eq!(fork.origin_snapshot, root.id);
        assert_eq!(fork.head, root.id);
        assert!(fork.is_active());
        assert!(fork.stats.is_empty());

        let listed = forks.list(&entity).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, fork.id);
    }

    #[test]
    fn test_fork_commit_leaves_main_head_alone() {
        let (_dir, graph, forks) = make_managers();
        let entity = EntityKey::new("playlist", "mix");
        let root = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap();

        let fork = forks.create(&entity, &root.id, "bob").unwrap();
        let snapshot = forks
            .commit(&fork.id, tracks(&["a", "b"]), Author::human("bob"), &fork.head)
            .unwrap();

        assert_eq!(snapshot.fork_id.as_deref(), Some(fork.id.as_str()));
        assert_eq!(snapshot.parent.as_deref(), Some(root.id.as_str()));

        let reloaded = forks.get(&fork.id).unwrap();
        assert_eq!(reloaded.head, snapshot.id);
        assert_eq!(reloaded.stats.added, 1);

        // Main line is untouched
        assert_eq!(graph.head(&entity).unwrap().id, root.id);
        assert_eq!(graph.history(&entity).unwrap().len(), 1);
    }

    #[test]
    fn test_fork_commit_cas() {
        let (_dir, graph, forks) = make_managers();
        let entity = EntityKey::new("playlist", "mix");
        let root = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap();

        let fork = forks.create(&entity, &root.id, "bob").unwrap();
        forks
            .commit(&fork.id, tracks(&["a", "b"]), Author::human("bob"), &fork.head)
            .unwrap();

        let err = forks
            .commit(&fork.id, tracks(&["a", "c"]), Author::human("bob"), &root.id)
            .unwrap_err();
        assert!(matches!(err, VersionError::HeadConflict { .. }));
    }

    #[test]
    fn test_abandoned_fork_accepts_nothing() {
        let (_dir, graph, forks) = make_managers();
        let entity = EntityKey::new("playlist", "mix");
        let root = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap();

        let fork = forks.create(&entity, &root.id, "bob").unwrap();
        let abandoned = forks.abandon(&fork.id).unwrap();
        assert_eq!(abandoned.status, ForkStatus::Abandoned);

        let err = forks
            .commit(&fork.id, tracks(&["a", "b"]), Author::human("bob"), &root.id)
            .unwrap_err();
        assert!(matches!(err, VersionError::InvalidOperation { .. }));

        let err = forks.abandon(&fork.id).unwrap_err();
        assert!(matches!(err, VersionError::InvalidOperation { .. }));
    }

    #[test]
    fn test_fork_requires_main_line_snapshot() {
        let (_dir, graph, forks) = make_managers();
        let entity = EntityKey::new("playlist", "mix");
        let root = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap();

        // Unknown snapshot
        let err = forks.create(&entity, "missing", "bob").unwrap_err();
        assert!(matches!(err, VersionError::SnapshotNotFound { .. }));

        // Snapshot on a fork, not the main line
        let fork = forks.create(&entity, &root.id, "bob").unwrap();
        let fork_snapshot = forks
            .commit(&fork.id, tracks(&["a", "b"]), Author::human("bob"), &fork.head)
            .unwrap();
        let err = forks.create(&entity, &fork_snapshot.id, "bob").unwrap_err();
        assert!(matches!(err, VersionError::InvalidOperation { .. }));
    }
}
