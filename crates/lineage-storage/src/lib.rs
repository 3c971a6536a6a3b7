//! Lineage Storage - Storage abstraction and redb backend
//!
//! This crate provides:
//! - KVStore trait for storage abstraction
//! - redb-based implementation
//! - Key encoding for the persisted version-graph layout
//! - Transaction support

pub mod error;
pub mod encoding;
pub mod kv;
pub mod redb_backend;

// Re-export commonly used types
pub use encoding::KeyEncoder;
pub use error::{Result, StorageError};
pub use kv::{KVStore, Transaction};
pub use redb_backend::RedbBackend;
