use crate::snapshot::ChangeSummary;
use lineage_core::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Synthetic path carried by Reorder entries
///
/// Item ids starting with '~' are rejected at validation time, so this can
/// never collide with a real item.
pub const ORDER_PATH: &str = "~order";

/// Kind of change at one path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOp {
    Add,
    Remove,
    Modify,
    Reorder,
}

/// A single change at a stable path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// Kind of change
    pub op: ChangeOp,
    /// Stable item identity the change applies to, or [`ORDER_PATH`]
    pub path: String,
    /// Value before the change (absent for Add)
    pub old_value: Option<Value>,
    /// Value after the change (absent for Remove)
    pub new_value: Option<Value>,
}

impl Change {
    /// An item only present in the new payload
    pub fn add(path: impl Into<String>, new_value: Value) -> Self {
        Self {
            op: ChangeOp::Add,
            path: path.into(),
            old_value: None,
            new_value: Some(new_value),
        }
    }

    /// An item only present in the old payload
    pub fn remove(path: impl Into<String>, old_value: Value) -> Self {
        Self {
            op: ChangeOp::Remove,
            path: path.into(),
            old_value: Some(old_value),
            new_value: None,
        }
    }

    /// An item present in both payloads with different content
    pub fn modify(path: impl Into<String>, old_value: Value, new_value: Value) -> Self {
        Self {
            op: ChangeOp::Modify,
            path: path.into(),
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    /// A change in the relative order of items present in both payloads
    pub fn reorder(old_order: Vec<String>, new_order: Vec<String>) -> Self {
        Self {
            op: ChangeOp::Reorder,
            path: ORDER_PATH.to_string(),
            old_value: Some(Value::from(old_order)),
            new_value: Some(Value::from(new_order)),
        }
    }
}

/// A structured description of the differences between two payloads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

impl ChangeSet {
    /// True when the payloads were identical
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of change entries
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Iterate over the changes in order
    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    /// Look up the change at a path, if any
    pub fn get(&self, path: &str) -> Option<&Change> {
        self.changes.iter().find(|c| c.path == path)
    }

    /// Count the changes into a summary
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for change in &self.changes {
            match change.op {
                ChangeOp::Add => summary.added += 1,
                ChangeOp::Remove => summary.removed += 1,
                ChangeOp::Modify => summary.changed += 1,
                ChangeOp::Reorder => summary.reordered += 1,
            }
        }
        summary
    }
}

/// Compute the structured change-set between two payloads
///
/// Items are aligned by stable id. Items present in both payloads with equal
/// content produce nothing; differing content produces Modify; items only in
/// `new` produce Add; items only in `old` produce Remove. A change in the
/// relative order of items present in both payloads produces a single
/// Reorder entry instead of per-item removes and adds.
///
/// `diff(s, s)` is always empty.
pub fn diff(old: &Payload, new: &Payload) -> ChangeSet {
    let old_by_id: HashMap<&str, &Value> = old
        .items
        .iter()
        .map(|item| (item.id.as_str(), &item.value))
        .collect();
    let new_by_id: HashMap<&str, &Value> = new
        .items
        .iter()
        .map(|item| (item.id.as_str(), &item.value))
        .collect();

    let mut changes = Vec::new();

    // Removes in old-payload order
    for item in &old.items {
        if !new_by_id.contains_key(item.id.as_str()) {
            changes.push(Change::remove(&item.id, item.value.clone()));
        }
    }

    // Adds and modifies in new-payload order
    for item in &new.items {
        match old_by_id.get(item.id.as_str()) {
            None => changes.push(Change::add(&item.id, item.value.clone())),
            Some(old_value) if **old_value != item.value => {
                changes.push(Change::modify(
                    &item.id,
                    (*old_value).clone(),
                    item.value.clone(),
                ));
            }
            Some(_) => {}
        }
    }

    // Relative order of the items present on both sides
    let old_order: Vec<String> = old
        .items
        .iter()
        .filter(|item| new_by_id.contains_key(item.id.as_str()))
        .map(|item| item.id.clone())
        .collect();
    let new_order: Vec<String> = new
        .items
        .iter()
        .filter(|item| old_by_id.contains_key(item.id.as_str()))
        .map(|item| item.id.clone())
        .collect();
    if old_order != new_order {
        changes.push(Change::reorder(old_order, new_order));
    }

    ChangeSet { changes }
}
