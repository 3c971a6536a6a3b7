use crate::Result;
use bytes::Bytes;

/// Key-value store trait
///
/// The version graph persists through this seam only; swapping the backing
/// engine means implementing these two traits.
pub trait KVStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Put a key-value pair
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key
    fn delete(&self, key: &[u8]) -> Result<()>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Scan all key-value pairs whose key starts with the prefix, in key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>>;

    /// Begin a transaction
    fn transaction(&self) -> Result<Box<dyn Transaction>>;
}

/// Transaction trait for atomic multi-key operations
///
/// A dropped transaction that was never committed rolls back; writes become
/// visible only after commit.
pub trait Transaction: Send {
    /// Get a value by key, seeing earlier writes in this transaction
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Put a key-value pair
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Commit the transaction
    fn commit(self: Box<Self>) -> Result<()>;

    /// Roll the transaction back explicitly
    fn rollback(self: Box<Self>) -> Result<()>;
}
