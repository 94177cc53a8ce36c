//! Retention cleanup.
//!
//! Deletes rows whose last sync is older than the retention period from every
//! entity that is not reference data. Entities are cleaned one after another
//! and a failure of one never stops the others.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sync_core::{CleanupRecord, EntityCatalog, RecordStore};

/// One entity whose cleanup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFailure {
    pub entity: String,
    pub message: String,
}

/// A cleanup pass in which at least one entity failed.
#[derive(Debug, thiserror::Error)]
#[error(
    "cleanup failed for {} entities ({} rows deleted elsewhere): {}",
    .failures.len(),
    .rows_deleted,
    .failures.iter().map(|f| format!("{}: {}", f.entity, f.message)).collect::<Vec<_>>().join("; ")
)]
pub struct CleanupErrors {
    /// Rows deleted by the entities that succeeded
    pub rows_deleted: u64,
    pub failures: Vec<EntityFailure>,
}

pub struct Cleaner<S> {
    store: Arc<S>,
    catalog: Arc<EntityCatalog>,
    retention_days: u32,
    batch_size: u64,
}

impl<S: RecordStore> Cleaner<S> {
    pub fn new(store: Arc<S>, catalog: Arc<EntityCatalog>, retention_days: u32, batch_size: u64) -> Self {
        Self {
            store,
            catalog,
            retention_days,
            batch_size,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.retention_days > 0
    }

    /// Oldest sync time kept when cleaning at `now`, or `None` when the
    /// retention reaches past the earliest representable time.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Duration::try_days(i64::from(self.retention_days))
            .and_then(|retention| now.checked_sub_signed(retention))
    }

    /// Run one cleanup pass now. Returns the total rows deleted.
    pub async fn run(&self) -> Result<u64, CleanupErrors> {
        self.run_at(Utc::now()).await
    }

    /// Run one cleanup pass as of `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<u64, CleanupErrors> {
        if !self.is_enabled() {
            tracing::debug!("Retention disabled, skipping cleanup");
            return Ok(0);
        }

        let Some(cutoff) = self.cutoff(now) else {
            tracing::warn!(
                retention_days = self.retention_days,
                "Retention cutoff predates the earliest representable time, nothing to clean"
            );
            return Ok(0);
        };
        let mut rows_deleted = 0u64;
        let mut failures = Vec::new();

        for entity in self.catalog.all().iter().filter(|e| !e.is_reference_data) {
            let deleted = match self
                .store
                .cleanup_older_than(&entity.table, cutoff, self.batch_size)
                .await
            {
                Ok(deleted) => deleted,
                Err(e) => {
                    let message = format!("{e:#}");
                    tracing::error!(entity = %entity.slug, table = %entity.table, error = %message, "Cleanup failed");
                    failures.push(EntityFailure {
                        entity: entity.slug.clone(),
                        message,
                    });
                    continue;
                }
            };

            if deleted == 0 {
                continue;
            }
            rows_deleted += deleted;
            tracing::info!(entity = %entity.slug, deleted, %cutoff, "Deleted rows past retention");

            let record = CleanupRecord {
                entity: entity.slug.clone(),
                rows_deleted: deleted,
                oldest_kept: cutoff,
            };
            if let Err(e) = self.store.log_cleanup(&record).await {
                tracing::warn!(entity = %entity.slug, error = %format!("{e:#}"), "Failed to log cleanup");
            }
        }

        tracing::info!(rows_deleted, failed = failures.len(), "cleanup pass complete");
        if failures.is_empty() {
            Ok(rows_deleted)
        } else {
            Err(CleanupErrors {
                rows_deleted,
                failures,
            })
        }
    }
}
