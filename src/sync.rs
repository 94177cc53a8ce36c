//! Sync orchestration.
//!
//! The [`Engine`] applies storage migrations, evolves every entity table from
//! the source's field definitions, runs an initial sync pass and then keeps
//! syncing and cleaning up on two independent timers until cancelled.
//!
//! Within one pass each entity is synced by its own task, at most
//! `concurrency` at a time. An entity's failure is recorded in its checkpoint
//! and never affects the other entities.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use checkpoint::{CheckpointStore, SyncCheckpoint};
use chrono::{DateTime, SecondsFormat, Utc};
use flexibee_source::{FetchOptions, Paginator, SourceClient, SourceError};
use sync_core::{EntityCatalog, EntityDescriptor, RecordStore};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cleanup::Cleaner;

/// Source field holding a record's last change time.
pub const CHANGE_TIME_FIELD: &str = "lastUpdate";

/// Detail level requested for every page.
pub const DETAIL_LEVEL: &str = "full";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub sync_interval: Duration,
    /// Page size of every fetch
    pub batch_size: u32,
    /// Entities synced at the same time within one pass
    pub concurrency: usize,
    /// 0 disables cleanup
    pub retention_days: u32,
    pub cleanup_interval: Duration,
    pub cleanup_batch_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5 * 60),
            batch_size: 100,
            concurrency: 4,
            retention_days: 365,
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            cleanup_batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    /// Running the initial sync pass
    Syncing,
    /// Steady state, driven by the timers
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Syncing => "syncing",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Rows upserted by the successful entities
    pub rows: u64,
}

/// Stand-in deadline for a timer whose first tick cannot be represented.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// First tick of a timer with `period` started at `start`.
fn first_tick(start: Instant, period: Duration) -> Instant {
    start
        .checked_add(period)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Server-side filter selecting records changed after `watermark`.
pub fn incremental_filter(watermark: DateTime<Utc>) -> String {
    format!(
        "{CHANGE_TIME_FIELD} > '{}'",
        watermark.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

pub struct Engine<C, S> {
    source: Arc<C>,
    store: Arc<S>,
    catalog: Arc<EntityCatalog>,
    config: EngineConfig,
    cleaner: Cleaner<S>,
    state: watch::Sender<EngineState>,
}

impl<C, S> Engine<C, S>
where
    C: SourceClient + 'static,
    S: RecordStore + CheckpointStore + 'static,
{
    pub fn new(
        source: Arc<C>,
        store: Arc<S>,
        catalog: Arc<EntityCatalog>,
        config: EngineConfig,
    ) -> Self {
        let cleaner = Cleaner::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            config.retention_days,
            config.cleanup_batch_size,
        );
        let (state, _) = watch::channel(EngineState::Initializing);
        Self {
            source,
            store,
            catalog,
            config,
            cleaner,
            state,
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> EngineState {
        *self.state.borrow()
    }

    fn set_state(&self, state: EngineState) {
        tracing::info!(%state, "Engine state changed");
        self.state.send_replace(state);
    }

    /// Run until `cancel` fires.
    ///
    /// Only a migration failure is fatal; everything after it is isolated per
    /// entity and retried on the next timer tick.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.set_state(EngineState::Initializing);
        if let Err(e) = self.store.run_migrations().await {
            self.set_state(EngineState::Stopped);
            return Err(e).context("Failed to apply storage migrations");
        }
        self.ensure_schemas(&cancel).await;

        self.set_state(EngineState::Syncing);
        self.run_once(&cancel).await;

        self.set_state(EngineState::Running);
        let start = Instant::now();
        let mut sync_timer = interval_at(
            first_tick(start, self.config.sync_interval),
            self.config.sync_interval,
        );
        sync_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cleanup_timer = interval_at(
            first_tick(start, self.config.cleanup_interval),
            self.config.cleanup_interval,
        );
        cleanup_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sync_timer.tick() => {
                    self.run_once(&cancel).await;
                }
                _ = cleanup_timer.tick() => {
                    if let Err(e) = self.cleaner.run().await {
                        tracing::warn!(error = %e, "Cleanup pass finished with errors");
                    }
                }
            }
        }

        self.set_state(EngineState::ShuttingDown);
        self.set_state(EngineState::Stopped);
        Ok(())
    }

    /// Fetch each entity's field definitions and evolve its table.
    ///
    /// A field listing that cannot be fetched leaves the table with its base
    /// columns; a table that cannot be created fails that entity's syncs.
    pub async fn ensure_schemas(&self, cancel: &CancellationToken) {
        for entity in self.catalog.all() {
            let fields = match self.source.fetch_fields(&entity.slug, cancel).await {
                Ok(fields) => fields,
                Err(e) => {
                    tracing::warn!(
                        entity = %entity.slug,
                        error = %e,
                        "Failed to fetch field definitions, using base columns only"
                    );
                    Vec::new()
                }
            };

            if let Err(e) = self.store.ensure_table(entity, &fields).await {
                tracing::error!(
                    entity = %entity.slug,
                    table = %entity.table,
                    error = %format!("{e:#}"),
                    "Failed to ensure table"
                );
            }
        }
    }

    /// Sync every catalog entity once and wait for all of them.
    pub async fn run_once(&self, cancel: &CancellationToken) -> PassSummary {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for entity in self.catalog.all().iter().cloned() {
            let source = Arc::clone(&self.source);
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let batch_size = self.config.batch_size;

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (entity.slug, Err(anyhow::Error::new(e))),
                };
                let result = sync_entity(&*source, &*store, &entity, batch_size, &cancel).await;
                (entity.slug, result)
            });
        }

        let mut summary = PassSummary::default();
        while let Some(joined) = tasks.join_next().await {
            summary.attempted += 1;
            match joined {
                Ok((_, Ok(rows))) => {
                    summary.succeeded += 1;
                    summary.rows += rows;
                }
                Ok((_, Err(_))) => summary.failed += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!(error = %e, "Entity sync task aborted");
                }
            }
        }

        tracing::info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            rows = summary.rows,
            "sync pass complete"
        );
        summary
    }

    pub fn cleaner(&self) -> &Cleaner<S> {
        &self.cleaner
    }
}

/// Sync one entity and record the outcome in its checkpoint.
///
/// Returns the rows upserted. On failure the checkpoint keeps its previous
/// watermark and row count.
pub async fn sync_entity<C, S>(
    source: &C,
    store: &S,
    entity: &EntityDescriptor,
    batch_size: u32,
    cancel: &CancellationToken,
) -> Result<u64>
where
    C: SourceClient + ?Sized,
    S: RecordStore + CheckpointStore + ?Sized,
{
    let slug = entity.slug.as_str();
    let prior = match store.read_checkpoint(slug).await {
        Ok(prior) => prior,
        Err(e) => {
            // Without the prior state there is nothing safe to write back
            tracing::error!(entity = slug, error = %format!("{e:#}"), "Failed to read checkpoint");
            return Err(e);
        }
    };

    let started = Utc::now();
    let mut options = FetchOptions::default()
        .with_limit(batch_size)
        .with_detail(DETAIL_LEVEL);
    if let Some(watermark) = prior.as_ref().and_then(|p| p.watermark) {
        options = options.with_filter(incremental_filter(watermark));
    }
    let incremental = options.filter.is_some();
    tracing::debug!(entity = slug, incremental, "Syncing entity");

    let outcome = drain(source, store, entity, options, cancel).await;
    let finished = Utc::now();

    match outcome {
        Ok(upserted) => {
            let checkpoint = SyncCheckpoint::succeeded(prior.as_ref(), started, upserted, finished);
            store
                .store_checkpoint(slug, &checkpoint)
                .await
                .with_context(|| format!("Failed to store checkpoint for '{slug}'"))?;
            tracing::info!(
                entity = slug,
                rows = upserted,
                total_rows = checkpoint.row_count,
                incremental,
                "Entity synced"
            );
            Ok(upserted)
        }
        Err(e) => {
            let message = format!("{e:#}");
            tracing::error!(entity = slug, error = %message, "Entity sync failed");
            let checkpoint = SyncCheckpoint::failed(prior.as_ref(), message, finished);
            if let Err(store_err) = store.store_checkpoint(slug, &checkpoint).await {
                tracing::error!(
                    entity = slug,
                    error = %format!("{store_err:#}"),
                    "Failed to store error checkpoint"
                );
            }
            Err(e)
        }
    }
}

/// Fetch and upsert pages in offset order until the source is drained.
async fn drain<C, S>(
    source: &C,
    store: &S,
    entity: &EntityDescriptor,
    options: FetchOptions,
    cancel: &CancellationToken,
) -> Result<u64>
where
    C: SourceClient + ?Sized,
    S: RecordStore + ?Sized,
{
    let mut paginator = Paginator::new(source, entity.slug.clone(), options);
    let mut upserted = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled.into());
        }
        let Some(page) = paginator
            .next(cancel)
            .await
            .with_context(|| format!("Failed to fetch page at offset {}", paginator.fetched()))?
        else {
            break;
        };
        upserted += store
            .upsert_records(&entity.table, &page.records, &entity.primary_key)
            .await
            .with_context(|| format!("Failed to upsert into '{}'", entity.table))?;
    }

    Ok(upserted)
}
