//! Storage operations needed by the sync engine.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityDescriptor, FieldDescriptor, Record};

/// Append-only log entry written for each cleanup pass that deleted rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupRecord {
    /// Entity slug the rows belonged to
    pub entity: String,
    /// Number of rows deleted by the pass
    pub rows_deleted: u64,
    /// Retention cutoff; rows at or after this instant were kept
    pub oldest_kept: DateTime<Utc>,
}

/// Trait for the relational destination.
///
/// All identifiers passed in are source-provided names; implementations are
/// responsible for normalising and quoting them.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Apply the store's own bookkeeping schema.
    async fn run_migrations(&self) -> Result<()>;

    /// Create the entity's table if absent and add a column for every field
    /// that does not have one yet. Existing columns are never altered.
    async fn ensure_table(&self, entity: &EntityDescriptor, fields: &[FieldDescriptor])
        -> Result<()>;

    /// Insert-or-replace records keyed by `primary_key`.
    ///
    /// Returns the number of records written. Records that individually fail
    /// are skipped; only a failure affecting the whole batch is an error.
    async fn upsert_records(&self, table: &str, records: &[Record], primary_key: &str)
        -> Result<u64>;

    /// Delete rows by primary key value, returning the number removed.
    async fn delete_records(&self, table: &str, primary_key: &str, ids: &[i64]) -> Result<u64>;

    /// Delete rows synced strictly before `cutoff`, at most `batch_size` rows
    /// per round-trip, until a round deletes fewer than `batch_size`.
    async fn cleanup_older_than(
        &self,
        table: &str,
        cutoff: DateTime<Utc>,
        batch_size: u64,
    ) -> Result<u64>;

    /// Append a cleanup log entry.
    async fn log_cleanup(&self, record: &CleanupRecord) -> Result<()>;
}
