use lineage_core::EntityKey;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;

type LockKey = (String, String);

/// Exclusive locks keyed by (entity, fork)
///
/// A merge holds its key for the duration of the merge only; unrelated
/// entities and other forks of the same entity use different keys and
/// proceed without blocking.
#[derive(Default)]
pub struct MergeLocks {
    held: Mutex<HashSet<LockKey>>,
    released: Condvar,
}

impl MergeLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for (entity, fork), blocking while another holder
    /// has the same key
    pub fn acquire(&self, entity: &EntityKey, fork_id: &str) -> MergeLockGuard<'_> {
        let key = (entity.storage_key(), fork_id.to_string());

        let mut held = self.held.lock();
        while held.contains(&key) {
            self.released.wait(&mut held);
        }
        held.insert(key.clone());

        MergeLockGuard { locks: self, key }
    }
}

/// Releases the (entity, fork) key on drop
pub struct MergeLockGuard<'a> {
    locks: &'a MergeLocks,
    key: LockKey,
}

impl Drop for MergeLockGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        held.remove(&self.key);
        self.locks.released.notify_all();
    }
}
