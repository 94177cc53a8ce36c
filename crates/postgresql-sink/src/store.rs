//! PostgresStore: the RecordStore and CheckpointStore over tokio-postgres.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use checkpoint::{CheckpointStore, SyncCheckpoint};
use chrono::{DateTime, Utc};
use sync_core::{CleanupRecord, EntityDescriptor, FieldDescriptor, Record, RecordStore};
use tokio_postgres::{Client, NoTls};

use crate::{cleanup, migrations, schema, sync_state, upsert};

/// A fixed set of multiplexed connections handed out round-robin.
///
/// Each tokio-postgres client pipelines concurrent queries, so a handful of
/// connections serve all entity tasks.
pub struct PostgresStore {
    clients: Vec<Client>,
    next: AtomicUsize,
}

impl PostgresStore {
    /// Open `connections` connections (at least one) to `connection_string`.
    pub async fn connect(connection_string: &str, connections: usize) -> Result<Self> {
        let mut clients = Vec::with_capacity(connections.max(1));
        for _ in 0..connections.max(1) {
            let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
                .await
                .context("Failed to connect to PostgreSQL")?;

            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!("PostgreSQL connection error: {e}");
                }
            });
            clients.push(client);
        }
        tracing::info!(connections = clients.len(), "Connected to PostgreSQL");
        Self::from_clients(clients)
    }

    /// Wrap already established clients.
    pub fn from_clients(clients: Vec<Client>) -> Result<Self> {
        anyhow::ensure!(!clients.is_empty(), "PostgresStore needs at least one client");
        Ok(Self {
            clients,
            next: AtomicUsize::new(0),
        })
    }

    pub fn client(&self) -> &Client {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[i]
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn run_migrations(&self) -> Result<()> {
        migrations::run_migrations(self.client()).await
    }

    async fn ensure_table(&self, entity: &EntityDescriptor, fields: &[FieldDescriptor]) -> Result<()> {
        schema::ensure_table(self.client(), entity, fields).await
    }

    async fn upsert_records(&self, table: &str, records: &[Record], primary_key: &str) -> Result<u64> {
        upsert::upsert_records(self.client(), table, records, primary_key).await
    }

    async fn delete_records(&self, table: &str, primary_key: &str, ids: &[i64]) -> Result<u64> {
        cleanup::delete_records(self.client(), table, primary_key, ids).await
    }

    async fn cleanup_older_than(
        &self,
        table: &str,
        cutoff: DateTime<Utc>,
        batch_size: u64,
    ) -> Result<u64> {
        cleanup::cleanup_older_than(self.client(), table, cutoff, batch_size).await
    }

    async fn log_cleanup(&self, record: &CleanupRecord) -> Result<()> {
        cleanup::log_cleanup(self.client(), record).await
    }
}

#[async_trait]
impl CheckpointStore for PostgresStore {
    async fn read_checkpoint(&self, entity: &str) -> Result<Option<SyncCheckpoint>> {
        sync_state::read_checkpoint(self.client(), entity).await
    }

    async fn store_checkpoint(&self, entity: &str, checkpoint: &SyncCheckpoint) -> Result<()> {
        sync_state::store_checkpoint(self.client(), entity, checkpoint).await
    }
}
