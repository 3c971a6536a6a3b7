use crate::diff::{diff, Change, ChangeOp, ChangeSet};
use crate::error::{Result, VersionError};
use crate::fork::{ForkManager, ForkStatus};
use crate::graph::VersionGraph;
use crate::locks::MergeLocks;
use crate::snapshot::Snapshot;
use lineage_core::{Author, Payload, PayloadItem};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Synthetic path reported by whole-payload conflicts
pub const PAYLOAD_PATH: &str = "~payload";

/// Conflict granularity of the three-way merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Conflict only where both sides changed the same path differently
    #[default]
    PathLevel,
    /// Conflict whenever both sides changed anything and disagree
    WholePayload,
}

/// Outcome status of a merge attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStatus {
    Clean,
    Conflict,
}

/// One path both sides changed to different results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConflict {
    /// The contested path
    pub path: String,
    /// Value at the common origin (absent if the path did not exist there)
    pub base: Option<Value>,
    /// Resulting value on the entity's main line (absent if removed)
    pub ours: Option<Value>,
    /// Resulting value on the fork (absent if removed)
    pub theirs: Option<Value>,
}

/// Result of merging a fork back into its origin entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub status: MergeStatus,
    /// The merge snapshot, present only on a clean merge
    pub snapshot: Option<Snapshot>,
    /// The contested paths, present only on a conflict
    pub conflicts: Vec<MergeConflict>,
}

impl MergeOutcome {
    fn clean(snapshot: Snapshot) -> Self {
        Self {
            status: MergeStatus::Clean,
            snapshot: Some(snapshot),
            conflicts: Vec::new(),
        }
    }

    fn conflict(conflicts: Vec<MergeConflict>) -> Self {
        Self {
            status: MergeStatus::Conflict,
            snapshot: None,
            conflicts,
        }
    }

    /// True when the merge landed
    pub fn is_clean(&self) -> bool {
        self.status == MergeStatus::Clean
    }
}

/// Three-way merges a fork's head back into its origin entity
///
/// `base` is the fork's origin snapshot, `ours` the entity's current head,
/// `theirs` the fork's head. Merges are all-or-nothing: any conflict leaves
/// the entity head and the fork untouched.
pub struct MergeEngine {
    graph: VersionGraph,
    forks: ForkManager,
    locks: Arc<MergeLocks>,
    policy: MergePolicy,
}

impl MergeEngine {
    /// Create a MergeEngine with the default path-level policy
    pub fn new(graph: VersionGraph, forks: ForkManager, locks: Arc<MergeLocks>) -> Self {
        Self::with_policy(graph, forks, locks, MergePolicy::default())
    }

    /// Create a MergeEngine with an explicit conflict granularity
    pub fn with_policy(
        graph: VersionGraph,
        forks: ForkManager,
        locks: Arc<MergeLocks>,
        policy: MergePolicy,
    ) -> Self {
        Self {
            graph,
            forks,
            locks,
            policy,
        }
    }

    /// Merge a fork into its origin entity
    ///
    /// Holds the (entity, fork) lock for the duration of the merge. On a
    /// clean merge the synthesized payload is committed with the entity
    /// head as its single parent, the fork provenance recorded on the
    /// snapshot, and the fork marked Merged in the same transaction.
    pub fn merge(&self, fork_id: &str, author: Author) -> Result<MergeOutcome> {
        // Resolve the origin entity first so the lock key is known
        let origin = self.forks.get(fork_id)?.origin;
        let _guard = self.locks.acquire(&origin, fork_id);

        let mut txn = self.forks.storage().transaction()?;

        // Re-read under the lock; the fork may have transitioned meanwhile
        let mut fork = ForkManager::fork_in(&*txn, fork_id)?;
        if !fork.is_active() {
            return Err(VersionError::invalid_operation(
                format!("fork {} is {}", fork.id, fork.status),
                "Only Active forks can be merged",
            ));
        }

        let entity = fork.origin.clone();
        let record = VersionGraph::entity_in(&*txn, &entity)?;
        let base = VersionGraph::snapshot_in(&*txn, &fork.origin_snapshot)?;
        let ours = VersionGraph::snapshot_in(&*txn, &record.head)?;
        let theirs = VersionGraph::snapshot_in(&*txn, &fork.head)?;

        let ours_changes = diff(&base.payload, &ours.payload);
        let theirs_changes = diff(&base.payload, &theirs.payload);

        let conflicts = match self.policy {
            MergePolicy::PathLevel => conflicts_between(&ours_changes, &theirs_changes),
            MergePolicy::WholePayload => {
                whole_payload_conflicts(&base, &ours, &theirs, &ours_changes, &theirs_changes)
            }
        };
        if !conflicts.is_empty() {
            debug!(
                "Merge of fork {} into {} hit {} conflicts",
                fork.id,
                entity,
                conflicts.len()
            );
            // All-or-nothing: the open transaction rolls back on drop,
            // the fork stays Active and the head stays where it was.
            return Ok(MergeOutcome::conflict(conflicts));
        }

        let merged = match self.policy {
            MergePolicy::PathLevel => merge_payloads(
                &base.payload,
                &ours.payload,
                &theirs.payload,
                &ours_changes,
                &theirs_changes,
            ),
            MergePolicy::WholePayload => {
                if theirs_changes.is_empty() {
                    ours.payload.clone()
                } else {
                    theirs.payload.clone()
                }
            }
        };

        let snapshot = self.graph.commit_in(
            &mut *txn,
            &entity,
            merged,
            author,
            &record.head,
            Some(fork.id.clone()),
        )?;

        fork.status = ForkStatus::Merged;
        ForkManager::store_fork_in(&mut *txn, &fork)?;
        txn.commit()?;

        info!("Merged fork {} into {} as {}", fork.id, entity, snapshot.id);
        Ok(MergeOutcome::clean(snapshot))
    }
}

/// Paths both sides changed to different resulting values
fn conflicts_between(ours: &ChangeSet, theirs: &ChangeSet) -> Vec<MergeConflict> {
    let theirs_by_path: HashMap<&str, &Change> =
        theirs.iter().map(|c| (c.path.as_str(), c)).collect();

    let mut conflicts = Vec::new();
    for change in ours.iter() {
        let Some(their_change) = theirs_by_path.get(change.path.as_str()) else {
            continue;
        };
        // Both sides converging on the same result is not a conflict
        if change.new_value != their_change.new_value {
            conflicts.push(MergeConflict {
                path: change.path.clone(),
                base: change.old_value.clone(),
                ours: change.new_value.clone(),
                theirs: their_change.new_value.clone(),
            });
        }
    }
    conflicts
}

/// Whole-payload granularity: any divergence is one conflict
fn whole_payload_conflicts(
    base: &Snapshot,
    ours: &Snapshot,
    theirs: &Snapshot,
    ours_changes: &ChangeSet,
    theirs_changes: &ChangeSet,
) -> Vec<MergeConflict> {
    if ours_changes.is_empty() || theirs_changes.is_empty() || ours.payload == theirs.payload {
        return Vec::new();
    }
    vec![MergeConflict {
        path: PAYLOAD_PATH.to_string(),
        base: serde_json::to_value(&base.payload).ok(),
        ours: serde_json::to_value(&ours.payload).ok(),
        theirs: serde_json::to_value(&theirs.payload).ok(),
    }]
}

/// Synthesize the merged payload from two conflict-free change-sets
fn merge_payloads(
    base: &Payload,
    ours: &Payload,
    theirs: &Payload,
    ours_changes: &ChangeSet,
    theirs_changes: &ChangeSet,
) -> Payload {
    let mut removed: HashSet<&str> = HashSet::new();
    let mut modified: HashMap<&str, &Value> = HashMap::new();
    let mut reorder: Option<Vec<String>> = None;

    for change in ours_changes.iter().chain(theirs_changes.iter()) {
        match change.op {
            ChangeOp::Remove => {
                removed.insert(change.path.as_str());
            }
            ChangeOp::Modify => {
                if let Some(value) = &change.new_value {
                    modified.insert(change.path.as_str(), value);
                }
            }
            ChangeOp::Reorder => {
                // At most one distinct ordering survives conflict detection
                if reorder.is_none() {
                    reorder = change.new_value.as_ref().and_then(sequence_ids);
                }
            }
            ChangeOp::Add => {}
        }
    }

    // Surviving base items, in the reordered sequence if one side moved them
    let survivors: HashSet<&str> = base
        .items
        .iter()
        .map(|item| item.id.as_str())
        .filter(|id| !removed.contains(id))
        .collect();

    let base_values: HashMap<&str, &Value> = base
        .items
        .iter()
        .map(|item| (item.id.as_str(), &item.value))
        .collect();

    let ordered_ids: Vec<String> = match &reorder {
        Some(sequence) => sequence
            .iter()
            .filter(|id| survivors.contains(id.as_str()))
            .cloned()
            .collect(),
        None => base
            .items
            .iter()
            .filter(|item| survivors.contains(item.id.as_str()))
            .map(|item| item.id.clone())
            .collect(),
    };

    let mut items: Vec<PayloadItem> = ordered_ids
        .iter()
        .map(|id| {
            let value = modified
                .get(id.as_str())
                .copied()
                .or_else(|| base_values.get(id.as_str()).copied());
            PayloadItem::new(id.clone(), value.cloned().unwrap_or(Value::Null))
        })
        .collect();

    // Place each side's additions after their nearest surviving neighbor
    // in that side's own ordering
    for (side, side_changes) in [(ours, ours_changes), (theirs, theirs_changes)] {
        let added: HashSet<&str> = side_changes
            .iter()
            .filter(|c| c.op == ChangeOp::Add)
            .map(|c| c.path.as_str())
            .collect();

        for (pos, item) in side.items.iter().enumerate() {
            if !added.contains(item.id.as_str()) {
                continue;
            }
            if items.iter().any(|existing| existing.id == item.id) {
                // The other side added the identical item
                continue;
            }
            let insert_at = side.items[..pos]
                .iter()
                .rev()
                .find_map(|prev| {
                    items
                        .iter()
                        .position(|existing| existing.id == prev.id)
                        .map(|i| i + 1)
                })
                .unwrap_or(0);
            items.insert(insert_at, item.clone());
        }
    }

    Payload::with_items(base.entity_type.clone(), items)
}

fn sequence_ids(value: &Value) -> Option<Vec<String>> {
    value.as_array().map(|ids| {
        ids.iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .collect()
    })
}
