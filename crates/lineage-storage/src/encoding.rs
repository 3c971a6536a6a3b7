use lineage_core::EntityKey;

/// Key encoder for the persisted version-graph layout
///
/// One keyspace, four record kinds:
/// - `entity/{type}/{id}` — per-entity record holding the head pointer
/// - `snapshot/{snapshot_id}` — immutable snapshot records
/// - `fork/{fork_id}` — fork records
/// - `state/{type}/{id}` — materialized current payload
///
/// plus two secondary indices:
/// - `forks/{type}/{id}/{fork_id}` — forks by origin entity
/// - `children/{type}/{id}/{parent}/{snapshot_id}` — snapshots by
///   (entity, parent), with `root` standing in for a null parent
pub struct KeyEncoder;

const ROOT_PARENT: &str = "root";

impl KeyEncoder {
    /// Key of the per-entity head record
    pub fn entity_key(entity: &EntityKey) -> String {
        format!("entity/{}", entity.storage_key())
    }

    /// Key of a snapshot record
    pub fn snapshot_key(snapshot_id: &str) -> String {
        format!("snapshot/{}", snapshot_id)
    }

    /// Key of a fork record
    pub fn fork_key(fork_id: &str) -> String {
        format!("fork/{}", fork_id)
    }

    /// Key of the materialized current payload
    pub fn state_key(entity: &EntityKey) -> String {
        format!("state/{}", entity.storage_key())
    }

    /// Index entry for a fork under its origin entity
    pub fn fork_index_key(entity: &EntityKey, fork_id: &str) -> String {
        format!("forks/{}/{}", entity.storage_key(), fork_id)
    }

    /// Prefix scanning all forks of an entity
    pub fn fork_index_prefix(entity: &EntityKey) -> String {
        format!("forks/{}/", entity.storage_key())
    }

    /// Index entry for a snapshot under (entity, parent)
    pub fn child_index_key(
        entity: &EntityKey,
        parent_id: Option<&str>,
        snapshot_id: &str,
    ) -> String {
        format!(
            "children/{}/{}/{}",
            entity.storage_key(),
            parent_id.unwrap_or(ROOT_PARENT),
            snapshot_id
        )
    }

    /// Prefix scanning all children of (entity, parent)
    pub fn child_index_prefix(entity: &EntityKey, parent_id: Option<&str>) -> String {
        format!(
            "children/{}/{}/",
            entity.storage_key(),
            parent_id.unwrap_or(ROOT_PARENT)
        )
    }

    /// Extract the trailing id from an index key
    pub fn index_suffix(key: &str) -> Option<&str> {
        key.rsplit('/').next().filter(|s| !s.is_empty())
    }
}
