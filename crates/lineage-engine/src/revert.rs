use crate::error::{Result, VersionError};
use crate::graph::VersionGraph;
use crate::snapshot::Snapshot;
use lineage_core::{Author, EntityKey};
use tracing::info;

/// Materializes a past snapshot as a new current snapshot
///
/// Reverting moves forward: the result is a fresh snapshot carrying the
/// target's payload with the current head as parent, so the intervening
/// history and the fact of the revert both stay on record.
#[derive(Clone)]
pub struct RevertController {
    graph: VersionGraph,
}

impl RevertController {
    /// Create a new RevertController
    pub fn new(graph: VersionGraph) -> Self {
        Self { graph }
    }

    /// Revert an entity to a prior main-line snapshot
    ///
    /// The target must be reachable from the entity's head by the parent
    /// chain; snapshots on forks or belonging to other entities are
    /// rejected with InvalidOperation.
    pub fn revert(
        &self,
        entity: &EntityKey,
        target_snapshot_id: &str,
        author: Author,
    ) -> Result<Snapshot> {
        let record = self.graph.entity(entity)?;

        if !self.graph.on_main_line(entity, target_snapshot_id)? {
            return Err(VersionError::invalid_operation(
                format!(
                    "snapshot {} is not in the main-line history of {}",
                    target_snapshot_id, entity
                ),
                "Only snapshots on the entity's own main line can be reverted to",
            ));
        }

        let target = self.graph.get(target_snapshot_id)?;
        let snapshot = self
            .graph
            .commit(entity, target.payload.clone(), author, &record.head)?;

        info!(
            "Reverted {} to {} as new head {}",
            entity, target_snapshot_id, snapshot.id
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fork::ForkManager;
    use lineage_core::{Payload, SchemaRegistry};
    use lineage_storage::{KVStore, RedbBackend};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn make_fixture() -> (tempfile::TempDir, VersionGraph, ForkManager, RevertController) {
        let dir = tempdir().unwrap();
        let backend: Arc<dyn KVStore> =
            Arc::new(RedbBackend::new(dir.path().join("test.redb")).unwrap());
        let graph = VersionGraph::new(backend.clone(), Arc::new(SchemaRegistry::new()));
        let forks = ForkManager::new(backend, graph.clone());
        let reverter = RevertController::new(graph.clone());
        (dir, graph, forks, reverter)
    }

    fn tracks(ids: &[&str]) -> Payload {
        let mut payload = Payload::new("playlist");
        for id in ids {
            payload = payload.item(*id, json!({ "title": id }));
        }
        payload
    }

    #[test]
    fn test_revert_is_a_forward_commit() {
        let (_dir, graph, _forks, reverter) = make_fixture();
        let entity = EntityKey::new("playlist", "mix");
        let author = Author::human("alice");

        let s0 = graph.init_entity(&entity, tracks(&["a"]), author.clone()).unwrap();
        let s1 = graph
            .commit(&entity, tracks(&["a", "b"]), author.clone(), &s0.id)
            .unwrap();

        let reverted = reverter.revert(&entity, &s0.id, author).unwrap();

        // Payload deep-equals the target, but the parent is the previous
        // head, so the intervening history survives
        assert_eq!(reverted.payload, s0.payload);
        assert_eq!(reverted.parent.as_deref(), Some(s1.id.as_str()));

        let history = graph.history(&entity).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].id, reverted.id);
    }

    #[test]
    fn test_revert_to_current_head_still_grows_history() {
        let (_dir, graph, _forks, reverter) = make_fixture();
        let entity = EntityKey::new("playlist", "mix");
        let author = Author::human("alice");

        let s0 = graph.init_entity(&entity, tracks(&["a"]), author.clone()).unwrap();
        let reverted = reverter.revert(&entity, &s0.id, author).unwrap();

        assert_eq!(reverted.payload, s0.payload);
        assert!(reverted.summary.is_empty());
        assert_eq!(graph.history(&entity).unwrap().len(), 2);
    }

    #[test]
    fn test_revert_rejects_fork_snapshots() {
        let (_dir, graph, forks, reverter) = make_fixture();
        let entity = EntityKey::new("playlist", "mix");
        let author = Author::human("alice");

        let s0 = graph.init_entity(&entity, tracks(&["a"]), author.clone()).unwrap();
        let fork = forks.create(&entity, &s0.id, "bob").unwrap();
        let fork_snapshot = forks
            .commit(&fork.id, tracks(&["a", "b"]), Author::human("bob"), &fork.head)
            .unwrap();

        let err = reverter.revert(&entity, &fork_snapshot.id, author).unwrap_err();
        assert!(matches!(err, VersionError::InvalidOperation { .. }));
    }

    #[test]
    fn test_revert_rejects_foreign_snapshots() {
        let (_dir, graph, _forks, reverter) = make_fixture();
        let author = Author::human("alice");

        let entity = EntityKey::new("playlist", "mix");
        graph.init_entity(&entity, tracks(&["a"]), author.clone()).unwrap();

        let other = EntityKey::new("playlist", "other");
        let other_root = graph.init_entity(&other, tracks(&["x"]), author.clone()).unwrap();

        let err = reverter.revert(&entity, &other_root.id, author).unwrap_err();
        assert!(matches!(err, VersionError::InvalidOperation { .. }));
    }
}
