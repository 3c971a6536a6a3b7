use crate::types::EntityKey;
use serde::{Deserialize, Serialize};

/// Kind of mutation an event describes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityEventKind {
    Committed,
    Forked,
    Merged,
    Reverted,
    Abandoned,
}

/// An event emitted after a successful mutation
///
/// Events are best-effort notifications: they are published after the
/// mutation is durable and a publish failure never fails the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEvent {
    /// Kind of mutation
    pub kind: EntityEventKind,
    /// Entity the mutation applied to
    pub entity: EntityKey,
    /// New head snapshot id, when the mutation advanced a head
    pub snapshot_id: Option<String>,
    /// Fork involved in the mutation, if any
    pub fork_id: Option<String>,
    /// Serialized detail record (snapshot or fork)
    pub detail: serde_json::Value,
}

impl EntityEvent {
    /// Create a COMMITTED event
    pub fn committed(entity: EntityKey, snapshot_id: String, detail: serde_json::Value) -> Self {
        Self {
            kind: EntityEventKind::Committed,
            entity,
            snapshot_id: Some(snapshot_id),
            fork_id: None,
            detail,
        }
    }

    /// Create a FORKED event
    pub fn forked(entity: EntityKey, fork_id: String, detail: serde_json::Value) -> Self {
        Self {
            kind: EntityEventKind::Forked,
            entity,
            snapshot_id: None,
            fork_id: Some(fork_id),
            detail,
        }
    }

    /// Create a MERGED event
    pub fn merged(
        entity: EntityKey,
        snapshot_id: String,
        fork_id: String,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            kind: EntityEventKind::Merged,
            entity,
            snapshot_id: Some(snapshot_id),
            fork_id: Some(fork_id),
            detail,
        }
    }

    /// Create a REVERTED event
    pub fn reverted(entity: EntityKey, snapshot_id: String, detail: serde_json::Value) -> Self {
        Self {
            kind: EntityEventKind::Reverted,
            entity,
            snapshot_id: Some(snapshot_id),
            fork_id: None,
            detail,
        }
    }

    /// Create an ABANDONED event
    pub fn abandoned(entity: EntityKey, fork_id: String, detail: serde_json::Value) -> Self {
        Self {
            kind: EntityEventKind::Abandoned,
            entity,
            snapshot_id: None,
            fork_id: Some(fork_id),
            detail,
        }
    }
}
