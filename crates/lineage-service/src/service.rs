use crate::auth::AuthContext;
use crate::entity_store::{EntityStore, KvEntityStore};
use crate::event_bus::{EventBus, EventBusConfig};
use crate::Result;
use lineage_core::{Author, EntityEvent, EntityKey, Payload, SchemaRegistry};
use lineage_engine::{
    diff, ChangeSet, Fork, ForkManager, MergeEngine, MergeLocks, MergeOutcome, MergePolicy,
    RevertController, Snapshot, VersionGraph,
};
use lineage_storage::KVStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Façade over the version-control engine
///
/// Resolves the acting identity before every mutation, validates payloads
/// against the schema registry, keeps the materialized current state in
/// sync with the head snapshot, and publishes best-effort events after
/// durable success. Engine errors reach callers unchanged.
pub struct VersionControl {
    graph: VersionGraph,
    forks: ForkManager,
    merger: MergeEngine,
    reverter: RevertController,
    auth: Arc<dyn AuthContext>,
    entity_store: Arc<dyn EntityStore>,
    events: EventBus,
}

impl VersionControl {
    /// Create a service with an empty schema registry and defaults
    pub fn new(storage: Arc<dyn KVStore>, auth: Arc<dyn AuthContext>) -> Self {
        Self::with_config(
            storage,
            auth,
            SchemaRegistry::new(),
            MergePolicy::default(),
            EventBusConfig::default(),
        )
    }

    /// Create a service with explicit schemas, merge policy, and event bus
    pub fn with_config(
        storage: Arc<dyn KVStore>,
        auth: Arc<dyn AuthContext>,
        schemas: SchemaRegistry,
        merge_policy: MergePolicy,
        event_config: EventBusConfig,
    ) -> Self {
        let graph = VersionGraph::new(storage.clone(), Arc::new(schemas));
        let forks = ForkManager::new(storage.clone(), graph.clone());
        let merger = MergeEngine::with_policy(
            graph.clone(),
            forks.clone(),
            Arc::new(MergeLocks::new()),
            merge_policy,
        );
        let reverter = RevertController::new(graph.clone());
        let entity_store: Arc<dyn EntityStore> = Arc::new(KvEntityStore::new(storage));

        Self {
            graph,
            forks,
            merger,
            reverter,
            auth,
            entity_store,
            events: EventBus::new(event_config),
        }
    }

    /// Subscribe to mutation events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EntityEvent> {
        self.events.subscribe()
    }

    // --- Mutations -------------------------------------------------------

    /// Initialize an entity with its root snapshot
    pub fn create_entity(&self, entity: &EntityKey, payload: Payload) -> Result<Snapshot> {
        let author = self.principal_for(entity)?;

        let snapshot = self.graph.init_entity(entity, payload, author)?;
        self.sync_state(entity, &snapshot)?;
        self.publish_snapshot(EntityEvent::committed, entity, &snapshot);

        Ok(snapshot)
    }

    /// Commit a new snapshot on the entity's main line
    ///
    /// `expected_parent` must be the head the caller based its payload on;
    /// losers of a concurrent commit race get HeadConflict and retry after
    /// re-reading the head.
    pub fn commit(
        &self,
        entity: &EntityKey,
        payload: Payload,
        expected_parent: &str,
    ) -> Result<Snapshot> {
        let author = self.principal_for(entity)?;

        let snapshot = self.graph.commit(entity, payload, author, expected_parent)?;
        self.sync_state(entity, &snapshot)?;
        self.publish_snapshot(EntityEvent::committed, entity, &snapshot);

        Ok(snapshot)
    }

    /// Create a fork of an entity at a main-line snapshot, owned by the
    /// acting user
    pub fn create_fork(&self, entity: &EntityKey, at_snapshot: &str) -> Result<Fork> {
        let author = self.principal_for(entity)?;

        let fork = self.forks.create(entity, at_snapshot, &author.id)?;
        if let Ok(detail) = serde_json::to_value(&fork) {
            self.events
                .publish(EntityEvent::forked(entity.clone(), fork.id.clone(), detail));
        }

        Ok(fork)
    }

    /// Commit a new snapshot on a fork, leaving the main line untouched
    pub fn commit_to_fork(
        &self,
        fork_id: &str,
        payload: Payload,
        expected_parent: &str,
    ) -> Result<Snapshot> {
        let fork = self.forks.get(fork_id)?;
        let author = self.principal_for(&fork.origin)?;

        let snapshot = self.forks.commit(fork_id, payload, author, expected_parent)?;
        if let Ok(detail) = serde_json::to_value(&snapshot) {
            let mut event =
                EntityEvent::committed(fork.origin.clone(), snapshot.id.clone(), detail);
            event.fork_id = Some(fork.id.clone());
            self.events.publish(event);
        }

        Ok(snapshot)
    }

    /// Merge a fork back into its origin entity
    ///
    /// Conflicts come back in the outcome, not as an error, so callers can
    /// present the contested paths for resolution; nothing changes on a
    /// conflict.
    pub fn merge_fork(&self, fork_id: &str) -> Result<MergeOutcome> {
        let fork = self.forks.get(fork_id)?;
        let author = self.principal_for(&fork.origin)?;

        let outcome = self.merger.merge(fork_id, author)?;
        match &outcome.snapshot {
            Some(snapshot) => {
                self.sync_state(&fork.origin, snapshot)?;
                if let Ok(detail) = serde_json::to_value(snapshot) {
                    self.events.publish(EntityEvent::merged(
                        fork.origin.clone(),
                        snapshot.id.clone(),
                        fork.id.clone(),
                        detail,
                    ));
                }
            }
            None => {
                warn!(
                    "Merge of fork {} into {} conflicted on {} paths",
                    fork_id,
                    fork.origin,
                    outcome.conflicts.len()
                );
            }
        }

        Ok(outcome)
    }

    /// Abandon a fork
    pub fn abandon_fork(&self, fork_id: &str) -> Result<Fork> {
        let fork = self.forks.get(fork_id)?;
        let _author = self.principal_for(&fork.origin)?;

        let fork = self.forks.abandon(fork_id)?;
        if let Ok(detail) = serde_json::to_value(&fork) {
            self.events.publish(EntityEvent::abandoned(
                fork.origin.clone(),
                fork.id.clone(),
                detail,
            ));
        }

        Ok(fork)
    }

    /// Revert an entity to a prior main-line snapshot
    ///
    /// Recorded as a forward-moving commit: history grows by one and the
    /// intervening snapshots stay on record.
    pub fn revert(&self, entity: &EntityKey, target_snapshot_id: &str) -> Result<Snapshot> {
        let author = self.principal_for(entity)?;

        let snapshot = self.reverter.revert(entity, target_snapshot_id, author)?;
        self.sync_state(entity, &snapshot)?;
        self.publish_snapshot(EntityEvent::reverted, entity, &snapshot);

        Ok(snapshot)
    }

    // --- Reads -----------------------------------------------------------

    /// The entity's main-line history, most recent first
    pub fn history(&self, entity: &EntityKey) -> Result<Vec<Snapshot>> {
        Ok(self.graph.history(entity)?)
    }

    /// Get a snapshot by id
    pub fn snapshot(&self, snapshot_id: &str) -> Result<Snapshot> {
        Ok(self.graph.get(snapshot_id)?)
    }

    /// The entity's current head snapshot
    pub fn head(&self, entity: &EntityKey) -> Result<Snapshot> {
        Ok(self.graph.head(entity)?)
    }

    /// Get a fork by id
    pub fn fork(&self, fork_id: &str) -> Result<Fork> {
        Ok(self.forks.get(fork_id)?)
    }

    /// List all forks of an entity
    pub fn list_forks(&self, entity: &EntityKey) -> Result<Vec<Fork>> {
        Ok(self.forks.list(entity)?)
    }

    /// Structured change-set between two snapshots
    pub fn diff(&self, snapshot_a: &str, snapshot_b: &str) -> Result<ChangeSet> {
        let a = self.graph.get(snapshot_a)?;
        let b = self.graph.get(snapshot_b)?;
        Ok(diff(&a.payload, &b.payload))
    }

    /// The materialized current state, as kept in sync by mutations
    pub fn current(&self, entity: &EntityKey) -> Result<Option<Payload>> {
        Ok(self.entity_store.load(entity)?)
    }

    // --- Internals -------------------------------------------------------

    fn principal_for(&self, entity: &EntityKey) -> Result<Author> {
        let user = self.auth.current_user()?;
        self.auth.authorize(&user, entity)?;
        Ok(user)
    }

    fn sync_state(&self, entity: &EntityKey, snapshot: &Snapshot) -> Result<()> {
        self.entity_store.save(entity, &snapshot.payload)?;
        Ok(())
    }

    fn publish_snapshot(
        &self,
        make: fn(EntityKey, String, serde_json::Value) -> EntityEvent,
        entity: &EntityKey,
        snapshot: &Snapshot,
    ) {
        if let Ok(detail) = serde_json::to_value(snapshot) {
            self.events
                .publish(make(entity.clone(), snapshot.id.clone(), detail));
            info!("Published event for {} at {}", entity, snapshot.id);
        }
    }
}
