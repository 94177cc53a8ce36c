//! Checkpoint management for flexibee-sync
//!
//! Tracks, per entity, how far incremental sync has progressed and how the
//! most recent attempt ended.
//!
//! # Architecture
//!
//! - [`SyncCheckpoint`] - The persisted per-entity state
//! - [`CheckpointStore`] - Point get/set keyed by entity slug
//! - [`MemoryStore`] - In-process store used by tests and dry runs
//!
//! The PostgreSQL-backed store lives in the `postgresql-sink` crate.
//!
//! # Invariants
//!
//! - The watermark only advances when a cycle succeeds.
//! - A failed cycle keeps the last known-good watermark and row count.
//! - `error_message` is present exactly when the status is `error`.

mod memory;
mod status;
pub mod store;


pub use memory::MemoryStore;
pub use status::CheckpointStatus;
pub use store::CheckpointStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync progress of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Change-time cursor used to filter the next incremental fetch
    pub watermark: Option<DateTime<Utc>>,
    /// When the most recent cycle ended, successful or not
    pub last_attempt: DateTime<Utc>,
    /// Rows upserted over all successful cycles
    pub row_count: u64,
    pub status: CheckpointStatus,
    pub error_message: Option<String>,
}

impl SyncCheckpoint {
    /// Checkpoint after a successful cycle.
    ///
    /// The watermark is replaced and `upserted` is added to the prior
    /// cumulative row count.
    pub fn succeeded(
        prior: Option<&SyncCheckpoint>,
        watermark: DateTime<Utc>,
        upserted: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let row_count = prior.map_or(0, |p| p.row_count).saturating_add(upserted);
        Self {
            watermark: Some(watermark),
            last_attempt: now,
            row_count,
            status: CheckpointStatus::Ok,
            error_message: None,
        }
    }

    /// Checkpoint after a failed cycle.
    ///
    /// Watermark and row count are carried over from `prior` unchanged.
    pub fn failed(
        prior: Option<&SyncCheckpoint>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            watermark: prior.and_then(|p| p.watermark),
            last_attempt: now,
            row_count: prior.map_or(0, |p| p.row_count),
            status: CheckpointStatus::Error,
            error_message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == CheckpointStatus::Ok
    }
}
