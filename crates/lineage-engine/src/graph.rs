use crate::diff::diff;
use crate::error::{Result, VersionError};
use crate::snapshot::{ChangeSummary, Snapshot};
use chrono::{DateTime, Utc};
use lineage_core::{Author, CoreError, EntityKey, Payload, SchemaRegistry};
use lineage_storage::{KVStore, KeyEncoder, StorageError, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted per-entity record
///
/// The head pointer is the only mutable reference in the whole model. It
/// advances exclusively through the compare-and-swap in [`VersionGraph`]
/// commits and never rewinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity identity
    pub key: EntityKey,
    /// Current head snapshot id
    pub head: String,
    /// When the entity was initialized
    pub created_at: DateTime<Utc>,
}

/// Append-only store of immutable snapshots with a per-entity head pointer
#[derive(Clone)]
pub struct VersionGraph {
    storage: Arc<dyn KVStore>,
    schemas: Arc<SchemaRegistry>,
}

impl VersionGraph {
    /// Create a new VersionGraph over a storage backend
    pub fn new(storage: Arc<dyn KVStore>, schemas: Arc<SchemaRegistry>) -> Self {
        Self { storage, schemas }
    }

    /// Initialize an entity with its root snapshot
    ///
    /// Fails with EntityExists if the entity was already initialized.
    pub fn init_entity(
        &self,
        entity: &EntityKey,
        payload: Payload,
        author: Author,
    ) -> Result<Snapshot> {
        self.check_payload(entity, &payload)?;

        let mut txn = self.storage.transaction()?;

        let entity_key = KeyEncoder::entity_key(entity);
        if txn.get(entity_key.as_bytes())?.is_some() {
            return Err(VersionError::entity_exists(entity.to_string()));
        }

        let snapshot = Snapshot::new(
            entity.clone(),
            None,
            None,
            author,
            payload,
            ChangeSummary::default(),
            None,
        );
        Self::store_snapshot_in(&mut *txn, &snapshot)?;

        let record = EntityRecord {
            key: entity.clone(),
            head: snapshot.id.clone(),
            created_at: snapshot.timestamp,
        };
        Self::store_entity_in(&mut *txn, &record)?;

        txn.commit()?;

        info!("Initialized entity {} at root {}", entity, snapshot.id);
        Ok(snapshot)
    }

    /// Commit a new snapshot on the entity's main line
    ///
    /// `expected_parent` must equal the entity's current head (lost-update
    /// protection); on mismatch the commit fails with HeadConflict and no
    /// snapshot is created. On success the head advances to the new snapshot.
    pub fn commit(
        &self,
        entity: &EntityKey,
        payload: Payload,
        author: Author,
        expected_parent: &str,
    ) -> Result<Snapshot> {
        let mut txn = self.storage.transaction()?;
        let snapshot = self.commit_in(&mut *txn, entity, payload, author, expected_parent, None)?;
        txn.commit()?;

        info!("Committed {} on {}", snapshot.id, entity);
        Ok(snapshot)
    }

    /// Commit inside an already-open transaction
    ///
    /// Used by commit itself and by the merge path, which must update the
    /// fork record in the same transaction.
    pub(crate) fn commit_in(
        &self,
        txn: &mut dyn Transaction,
        entity: &EntityKey,
        payload: Payload,
        author: Author,
        expected_parent: &str,
        merged_from: Option<String>,
    ) -> Result<Snapshot> {
        self.check_payload(entity, &payload)?;

        let mut record = Self::entity_in(&*txn, entity)?;
        if record.head != expected_parent {
            debug!(
                "Head conflict on {}: expected {}, actual {}",
                entity, expected_parent, record.head
            );
            return Err(VersionError::head_conflict(
                entity.to_string(),
                expected_parent,
                record.head,
            ));
        }

        let parent = Self::snapshot_in(&*txn, &record.head)?;
        let summary = diff(&parent.payload, &payload).summary();

        let snapshot = Snapshot::new(
            entity.clone(),
            Some(record.head.clone()),
            None,
            author,
            payload,
            summary,
            merged_from,
        );
        Self::store_snapshot_in(txn, &snapshot)?;

        record.head = snapshot.id.clone();
        Self::store_entity_in(txn, &record)?;

        Ok(snapshot)
    }

    /// Get a snapshot by id
    pub fn get(&self, snapshot_id: &str) -> Result<Snapshot> {
        let key = KeyEncoder::snapshot_key(snapshot_id);
        Self::decode_snapshot(snapshot_id, self.storage.get(key.as_bytes())?)
    }

    /// Get the entity record
    pub fn entity(&self, entity: &EntityKey) -> Result<EntityRecord> {
        let key = KeyEncoder::entity_key(entity);
        match self.storage.get(key.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes).map_err(StorageError::from)?),
            None => Err(VersionError::entity_not_found(entity.to_string())),
        }
    }

    /// Get the entity's current head snapshot
    pub fn head(&self, entity: &EntityKey) -> Result<Snapshot> {
        let record = self.entity(entity)?;
        self.get(&record.head)
    }

    /// The entity's main-line history, most recent first
    ///
    /// Produced by walking parent pointers from the head down to the root;
    /// the chain is unbroken by the immutability invariant.
    pub fn history(&self, entity: &EntityKey) -> Result<Vec<Snapshot>> {
        let record = self.entity(entity)?;

        let mut snapshots = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(record.head);

        while let Some(snapshot_id) = cursor {
            if !seen.insert(snapshot_id.clone()) {
                return Err(VersionError::internal(format!(
                    "Parent chain of {} revisits snapshot {}",
                    entity, snapshot_id
                )));
            }
            let snapshot = self.get(&snapshot_id)?;
            cursor = snapshot.parent.clone();
            snapshots.push(snapshot);
        }

        debug!("History of {} has {} snapshots", entity, snapshots.len());
        Ok(snapshots)
    }

    /// Check whether a snapshot is on the entity's main line
    ///
    /// True when the snapshot is reachable from the entity's head by the
    /// parent chain; fork snapshots and other entities' snapshots are not.
    pub fn on_main_line(&self, entity: &EntityKey, snapshot_id: &str) -> Result<bool> {
        let record = self.entity(entity)?;

        let mut cursor = Some(record.head);
        while let Some(current) = cursor {
            if current == snapshot_id {
                return Ok(true);
            }
            cursor = self.get(&current)?.parent;
        }
        Ok(false)
    }

    /// Ids of the snapshots committed directly on top of (entity, parent)
    ///
    /// `parent = None` lists the entity's root. Served from the
    /// (entity, parent) index, not by scanning snapshots.
    pub fn children(&self, entity: &EntityKey, parent: Option<&str>) -> Result<Vec<String>> {
        let prefix = KeyEncoder::child_index_prefix(entity, parent);
        let entries = self.storage.scan_prefix(prefix.as_bytes())?;

        Ok(entries
            .iter()
            .filter_map(|(key, _)| {
                KeyEncoder::index_suffix(&String::from_utf8_lossy(key)).map(str::to_string)
            })
            .collect())
    }

    /// Validate a payload for an entity: type tag match, structural
    /// invariants, then the entity type's registered schema
    pub(crate) fn check_payload(&self, entity: &EntityKey, payload: &Payload) -> Result<()> {
        if payload.entity_type != entity.entity_type {
            return Err(CoreError::schema_violation(
                &entity.entity_type,
                format!("payload is tagged '{}'", payload.entity_type),
                "The payload's entity type must match the entity it is committed to",
            )
            .into());
        }
        self.schemas.validate(payload)?;
        Ok(())
    }

    /// Load a snapshot through an open transaction
    pub(crate) fn snapshot_in(txn: &dyn Transaction, snapshot_id: &str) -> Result<Snapshot> {
        let key = KeyEncoder::snapshot_key(snapshot_id);
        Self::decode_snapshot(snapshot_id, txn.get(key.as_bytes())?)
    }

    /// Write a snapshot record and its (entity, parent) index entry
    pub(crate) fn store_snapshot_in(txn: &mut dyn Transaction, snapshot: &Snapshot) -> Result<()> {
        let bytes = serde_json::to_vec(snapshot).map_err(StorageError::from)?;
        let key = KeyEncoder::snapshot_key(&snapshot.id);
        txn.put(key.as_bytes(), &bytes)?;

        let index_key = KeyEncoder::child_index_key(
            &snapshot.entity,
            snapshot.parent.as_deref(),
            &snapshot.id,
        );
        txn.put(index_key.as_bytes(), snapshot.id.as_bytes())?;

        Ok(())
    }

    /// Load the entity record through an open transaction
    pub(crate) fn entity_in(txn: &dyn Transaction, entity: &EntityKey) -> Result<EntityRecord> {
        let key = KeyEncoder::entity_key(entity);
        match txn.get(key.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes).map_err(StorageError::from)?),
            None => Err(VersionError::entity_not_found(entity.to_string())),
        }
    }

    /// Write the entity record through an open transaction
    pub(crate) fn store_entity_in(txn: &mut dyn Transaction, record: &EntityRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record).map_err(StorageError::from)?;
        let key = KeyEncoder::entity_key(&record.key);
        txn.put(key.as_bytes(), &bytes)?;
        Ok(())
    }

    fn decode_snapshot(snapshot_id: &str, bytes: Option<bytes::Bytes>) -> Result<Snapshot> {
        match bytes {
            Some(bytes) => Ok(serde_json::from_slice(&bytes).map_err(StorageError::from)?),
            None => Err(VersionError::snapshot_not_found(snapshot_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_storage::RedbBackend;
    use serde_json::json;
    use tempfile::tempdir;

    fn make_graph() -> (tempfile::TempDir, VersionGraph) {
        let dir = tempdir().unwrap();
        let backend = Arc::new(RedbBackend::new(dir.path().join("test.redb")).unwrap());
        let graph = VersionGraph::new(backend, Arc::new(SchemaRegistry::new()));
        (dir, graph)
    }

    fn tracks(ids: &[&str]) -> Payload {
        let mut payload = Payload::new("playlist");
        for id in ids {
            payload = payload.item(*id, json!({ "title": id }));
        }
        payload
    }

    #[test]
    fn test_init_and_head() {
        let (_dir, graph) = make_graph();
        let entity = EntityKey::new("playlist", "mix");

        let root = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap();
        assert!(root.is_root());
        assert!(root.summary.is_empty());

        let head = graph.head(&entity).unwrap();
        assert_eq!(head.id, root.id);

        // Re-initializing is rejected
        let err = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap_err();
        assert!(matches!(err, VersionError::EntityExists { .. }));
    }

    #[test]
    fn test_commit_advances_head() {
        let (_dir, graph) = make_graph();
        let entity = EntityKey::new("playlist", "mix");

        let root = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap();
        let next = graph
            .commit(&entity, tracks(&["a", "b"]), Author::human("alice"), &root.id)
            .unwrap();

        assert_eq!(next.parent.as_deref(), Some(root.id.as_str()));
        assert_eq!(next.summary.added, 1);
        assert_eq!(graph.head(&entity).unwrap().id, next.id);
    }

    #[test]
    fn test_commit_with_stale_parent_conflicts() {
        let (_dir, graph) = make_graph();
        let entity = EntityKey::new("playlist", "mix");

        let root = graph
            .init_entity(&entity, tracks(&["a"]), Author::human("alice"))
            .unwrap();
        graph
            .commit(&entity, tracks(&["a", "b"]), Author::human("alice"), &root.id)
            .unwrap();

        // A second writer still holding the root as its expected parent loses
        let err = graph
            .commit(&entity, tracks(&["a", "c"]), Author::human("bob"), &root.id)
            .unwrap_err();
        assert!(matches!(err, VersionError::HeadConflict { .. }));

        // The losing commit created no snapshot
        assert_eq!(graph.history(&entity).unwrap().len(), 2);
    }

    #[test]
    fn test_commit_unknown_entity() {
        let (_dir, graph) = make_graph();
        let entity = EntityKey::new("playlist", "missing");

        let err = graph
            .commit(&entity, tracks(&["a"]), Author::human("alice"), "nope")
            .unwrap_err();
        assert!(matches!(err, VersionError::EntityNotFound { .. }));
    }

    #[test]
    fn test_history_order_and_chain() {
        let (_dir, graph) = make_graph();
        let entity = EntityKey::new("playlist", "mix");
        let author = Author::human("alice");

        let mut head = graph.init_entity(&entity, tracks(&["a"]), author.clone()).unwrap();
        for ids in [&["a", "b"][..], &["a", "b", "c"][..]] {
            head = graph.commit(&entity, tracks(ids), author.clone(), &head.id).unwrap();
        }

        let history = graph.history(&entity).unwrap();
        assert_eq!(history.len(), 3);

        // Most recent first, unbroken parent chain down to a parentless root
        assert_eq!(history[0].id, head.id);
        for pair in history.windows(2) {
            assert_eq!(pair[0].parent.as_deref(), Some(pair[1].id.as_str()));
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        assert!(history.last().unwrap().is_root());
    }

    #[test]
    fn test_payload_type_mismatch_is_rejected() {
        let (_dir, graph) = make_graph();
        let entity = EntityKey::new("playlist", "mix");

        let err = graph
            .init_entity(&entity, Payload::new("minsite"), Author::human("alice"))
            .unwrap_err();
        assert!(matches!(err, VersionError::Validation(_)));
    }

    #[test]
    fn test_children_index() {
        let (_dir, graph) = make_graph();
        let entity = EntityKey::new("playlist", "mix");
        let author = Author::human("alice");

        let root = graph.init_entity(&entity, tracks(&["a"]), author.clone()).unwrap();
        let next = graph
            .commit(&entity, tracks(&["a", "b"]), author, &root.id)
            .unwrap();

        assert_eq!(graph.children(&entity, None).unwrap(), vec![root.id.clone()]);
        assert_eq!(
            graph.children(&entity, Some(&root.id)).unwrap(),
            vec![next.id]
        );
    }
}
