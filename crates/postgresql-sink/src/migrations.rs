//! Bookkeeping schema, applied in order at startup.
//!
//! Every migration is idempotent, so re-running them is safe.

use anyhow::{Context, Result};
use tokio_postgres::Client;

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("001_sync_state", include_str!("../migrations/001_sync_state.sql")),
    ("002_cleanup_log", include_str!("../migrations/002_cleanup_log.sql")),
];

pub async fn run_migrations(client: &Client) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        client
            .batch_execute(sql)
            .await
            .with_context(|| format!("Migration {name} failed"))?;
        tracing::debug!(migration = name, "Applied migration");
    }
    tracing::info!(count = MIGRATIONS.len(), "Migrations applied");
    Ok(())
}
