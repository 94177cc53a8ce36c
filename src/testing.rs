//! In-memory doubles of the source and the store.
//!
//! [`FakeSource`] serves records by offset like a paginated REST source and
//! can be told to fail. [`MemoryRecordStore`] implements both
//! [`RecordStore`] and [`CheckpointStore`] and records the calls it receives.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use checkpoint::{CheckpointStore, MemoryStore, SyncCheckpoint};
use chrono::{DateTime, Utc};
use flexibee_source::{FetchOptions, SourceClient, SourceError};
use serde_json::{json, Value};
use sync_core::{
    CleanupRecord, EntityDescriptor, FieldDescriptor, Page, Record, RecordStore,
};
use tokio_util::sync::CancellationToken;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `count` records with ids `1..=count` and a `kod` field.
pub fn numbered_records(count: usize) -> Vec<Record> {
    (1..=count)
        .map(|i| Record::try_from(json!({ "id": i.to_string(), "kod": format!("R{i}") })).unwrap_or_default())
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct PageFailure {
    /// 0-based index of the first page fetch that fails
    from_call: usize,
    status: u16,
}

#[derive(Debug, Default)]
struct FakeEntity {
    records: Vec<Record>,
    fields: Option<Vec<FieldDescriptor>>,
    failure: Option<PageFailure>,
    requests: Vec<FetchOptions>,
}

/// Paginated source backed by in-memory records.
///
/// Pages are served by `start`/`limit` and always report the total. Filters
/// are recorded but not applied.
#[derive(Debug, Default)]
pub struct FakeSource {
    entities: Mutex<HashMap<String, FakeEntity>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(self, entity: &str, records: Vec<Record>) -> Self {
        self.set_records(entity, records);
        self
    }

    pub fn with_fields(self, entity: &str, fields: Vec<FieldDescriptor>) -> Self {
        lock(&self.entities).entry(entity.to_string()).or_default().fields = Some(fields);
        self
    }

    pub fn set_records(&self, entity: &str, records: Vec<Record>) {
        lock(&self.entities).entry(entity.to_string()).or_default().records = records;
    }

    /// Make every page fetch of `entity` from the `from_call`-th on (0-based,
    /// counted over the source's lifetime) fail with HTTP `status`.
    pub fn fail_pages_from(&self, entity: &str, from_call: usize, status: u16) {
        lock(&self.entities).entry(entity.to_string()).or_default().failure =
            Some(PageFailure { from_call, status });
    }

    pub fn clear_failure(&self, entity: &str) {
        if let Some(e) = lock(&self.entities).get_mut(entity) {
            e.failure = None;
        }
    }

    /// Options of every page request made for `entity`, in order.
    pub fn requests(&self, entity: &str) -> Vec<FetchOptions> {
        lock(&self.entities)
            .get(entity)
            .map(|e| e.requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SourceClient for FakeSource {
    async fn fetch_page(
        &self,
        entity: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> Result<Page, SourceError> {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }
        let mut entities = lock(&self.entities);
        let state = entities.entry(entity.to_string()).or_default();
        let call = state.requests.len();
        state.requests.push(options.clone());

        if let Some(failure) = state.failure {
            if call >= failure.from_call {
                return Err(SourceError::from_status(
                    failure.status,
                    format!("injected failure for {entity}"),
                ));
            }
        }

        let len = state.records.len();
        let start = usize::try_from(options.start).unwrap_or(len).min(len);
        let end = start.saturating_add(options.limit as usize).min(len);
        Ok(Page::new(state.records[start..end].to_vec(), Some(len as u64)))
    }

    async fn fetch_fields(
        &self,
        entity: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<FieldDescriptor>, SourceError> {
        match lock(&self.entities).get(entity).and_then(|e| e.fields.clone()) {
            Some(fields) => Ok(fields),
            None => Err(SourceError::from_status(
                404,
                format!("no properties for {entity}"),
            )),
        }
    }
}

/// One stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub record: Record,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryTable {
    columns: BTreeSet<String>,
    rows: BTreeMap<i64, StoredRow>,
}

/// In-memory destination with call recording and failure injection.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, MemoryTable>>,
    checkpoints: MemoryStore,
    cleanup_log: Mutex<Vec<CleanupRecord>>,
    /// (table, batch length) of every upsert call
    upsert_calls: Mutex<Vec<(String, usize)>>,
    cleanup_rounds: Mutex<HashMap<String, usize>>,
    failing_upserts: Mutex<HashSet<String>>,
    /// (table, id) rows whose individual write fails
    rejected_rows: Mutex<HashSet<(String, i64)>>,
    failing_cleanups: Mutex<HashSet<String>>,
    fail_migrations: Mutex<bool>,
    migrations_run: Mutex<usize>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_upserts(&self, table: &str) {
        lock(&self.failing_upserts).insert(table.to_string());
    }

    /// Make the write of row `id` in `table` fail; the rest of its batch
    /// still goes through.
    pub fn reject_row(&self, table: &str, id: i64) {
        lock(&self.rejected_rows).insert((table.to_string(), id));
    }

    pub fn fail_cleanup(&self, table: &str) {
        lock(&self.failing_cleanups).insert(table.to_string());
    }

    pub fn fail_migrations(&self) {
        *lock(&self.fail_migrations) = true;
    }

    pub fn migrations_run(&self) -> usize {
        *lock(&self.migrations_run)
    }

    pub fn upsert_calls(&self) -> Vec<(String, usize)> {
        lock(&self.upsert_calls).clone()
    }

    /// Batch sizes of the upserts into `table`, in call order.
    pub fn upsert_batches(&self, table: &str) -> Vec<usize> {
        lock(&self.upsert_calls)
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, n)| *n)
            .collect()
    }

    pub fn has_table(&self, table: &str) -> bool {
        lock(&self.tables).contains_key(table)
    }

    pub fn columns(&self, table: &str) -> Vec<String> {
        lock(&self.tables)
            .get(table)
            .map(|t| t.columns.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        lock(&self.tables).get(table).map_or(0, |t| t.rows.len())
    }

    pub fn row(&self, table: &str, id: i64) -> Option<StoredRow> {
        lock(&self.tables).get(table).and_then(|t| t.rows.get(&id).cloned())
    }

    /// Insert a row directly, bypassing upsert bookkeeping.
    pub fn insert_row(&self, table: &str, id: i64, synced_at: DateTime<Utc>) {
        let mut record = Record::new();
        record.insert("id", Value::from(id));
        lock(&self.tables)
            .entry(table.to_string())
            .or_default()
            .rows
            .insert(id, StoredRow { record, synced_at });
    }

    pub fn cleanup_log(&self) -> Vec<CleanupRecord> {
        lock(&self.cleanup_log).clone()
    }

    /// Delete round-trips made by cleanups of `table`.
    pub fn cleanup_rounds(&self, table: &str) -> usize {
        lock(&self.cleanup_rounds).get(table).copied().unwrap_or(0)
    }
}

fn primary_key_value(record: &Record, primary_key: &str) -> Option<i64> {
    match record.get(primary_key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn run_migrations(&self) -> Result<()> {
        if *lock(&self.fail_migrations) {
            return Err(anyhow!("injected migration failure"));
        }
        *lock(&self.migrations_run) += 1;
        Ok(())
    }

    async fn ensure_table(&self, entity: &EntityDescriptor, fields: &[FieldDescriptor]) -> Result<()> {
        let mut tables = lock(&self.tables);
        let table = tables.entry(entity.table.clone()).or_default();
        table.columns.insert(entity.primary_key.replace('-', "_"));
        table.columns.insert("raw_data".to_string());
        table.columns.insert("synced_at".to_string());
        for field in fields {
            table.columns.insert(field.name.replace('-', "_"));
        }
        Ok(())
    }

    async fn upsert_records(&self, table: &str, records: &[Record], primary_key: &str) -> Result<u64> {
        lock(&self.upsert_calls).push((table.to_string(), records.len()));
        if lock(&self.failing_upserts).contains(table) {
            return Err(anyhow!("injected upsert failure for {table}"));
        }

        let now = Utc::now();
        let rejected = lock(&self.rejected_rows).clone();
        let mut tables = lock(&self.tables);
        let stored = tables.entry(table.to_string()).or_default();
        let mut written = 0;
        for record in records {
            let Some(id) = primary_key_value(record, primary_key) else {
                continue;
            };
            if rejected.contains(&(table.to_string(), id)) {
                continue;
            }
            stored.rows.insert(
                id,
                StoredRow {
                    record: record.clone(),
                    synced_at: now,
                },
            );
            written += 1;
        }
        Ok(written)
    }

    async fn delete_records(&self, table: &str, _primary_key: &str, ids: &[i64]) -> Result<u64> {
        let mut tables = lock(&self.tables);
        let Some(stored) = tables.get_mut(table) else {
            return Ok(0);
        };
        Ok(ids.iter().filter(|id| stored.rows.remove(id).is_some()).count() as u64)
    }

    async fn cleanup_older_than(
        &self,
        table: &str,
        cutoff: DateTime<Utc>,
        batch_size: u64,
    ) -> Result<u64> {
        if lock(&self.failing_cleanups).contains(table) {
            return Err(anyhow!("injected cleanup failure for {table}"));
        }
        let batch_size = batch_size.max(1);
        let mut tables = lock(&self.tables);
        let Some(stored) = tables.get_mut(table) else {
            return Ok(0);
        };

        let mut total = 0u64;
        let mut rounds = 0usize;
        loop {
            let doomed: Vec<i64> = stored
                .rows
                .iter()
                .filter(|(_, row)| row.synced_at < cutoff)
                .map(|(id, _)| *id)
                .take(batch_size as usize)
                .collect();
            for id in &doomed {
                stored.rows.remove(id);
            }
            rounds += 1;
            total += doomed.len() as u64;
            if (doomed.len() as u64) < batch_size {
                break;
            }
        }
        *lock(&self.cleanup_rounds).entry(table.to_string()).or_default() += rounds;
        Ok(total)
    }

    async fn log_cleanup(&self, record: &CleanupRecord) -> Result<()> {
        lock(&self.cleanup_log).push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for MemoryRecordStore {
    async fn read_checkpoint(&self, entity: &str) -> Result<Option<SyncCheckpoint>> {
        self.checkpoints.read_checkpoint(entity).await
    }

    async fn store_checkpoint(&self, entity: &str, checkpoint: &SyncCheckpoint) -> Result<()> {
        self.checkpoints.store_checkpoint(entity, checkpoint).await
    }
}
