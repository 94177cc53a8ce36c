//! In-process checkpoint storage implementation.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{store::CheckpointStore, SyncCheckpoint};

/// In-memory implementation of CheckpointStore trait.
///
/// Checkpoints are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    checkpoints: RwLock<HashMap<String, SyncCheckpoint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities with a stored checkpoint.
    pub async fn len(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.checkpoints.read().await.is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn read_checkpoint(&self, entity: &str) -> Result<Option<SyncCheckpoint>> {
        Ok(self.checkpoints.read().await.get(entity).cloned())
    }

    async fn store_checkpoint(&self, entity: &str, checkpoint: &SyncCheckpoint) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(entity.to_string(), checkpoint.clone());
        tracing::debug!(entity, status = %checkpoint.status, "Stored checkpoint");
        Ok(())
    }
}
