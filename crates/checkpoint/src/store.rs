//! Checkpoint storage trait
//!
//! This module defines the CheckpointStore trait for backend-agnostic
//! checkpoint storage operations.

use anyhow::Result;
use async_trait::async_trait;

use crate::SyncCheckpoint;

/// Trait for checkpoint storage operations.
///
/// This trait abstracts the storage backend for checkpoint operations,
/// allowing the same sync logic to work with:
/// - In-process storage (`MemoryStore`)
/// - PostgreSQL (`PostgresStore` in the postgresql-sink crate)
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint of an entity.
    ///
    /// Returns None if the entity has never been synced. That is an expected
    /// state, distinct from a read failure.
    async fn read_checkpoint(&self, entity: &str) -> Result<Option<SyncCheckpoint>>;

    /// Create or replace the checkpoint of an entity.
    async fn store_checkpoint(&self, entity: &str, checkpoint: &SyncCheckpoint) -> Result<()>;
}
