//! Checkpoint persistence in the `sync_state` table.

use anyhow::{Context, Result};
use checkpoint::{CheckpointStatus, SyncCheckpoint};
use chrono::{DateTime, Utc};
use tokio_postgres::Client;

pub async fn read_checkpoint(client: &Client, entity: &str) -> Result<Option<SyncCheckpoint>> {
    let row = client
        .query_opt(
            "SELECT last_update, last_sync, row_count, status, error_msg \
             FROM sync_state WHERE evidence = $1",
            &[&entity],
        )
        .await
        .with_context(|| format!("Failed to read sync state for '{entity}'"))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let row_count: i64 = row.get(2);
    let status: String = row.get(3);
    Ok(Some(SyncCheckpoint {
        watermark: row.get::<_, Option<DateTime<Utc>>>(0),
        last_attempt: row.get(1),
        row_count: u64::try_from(row_count).unwrap_or(0),
        status: status
            .parse::<CheckpointStatus>()
            .with_context(|| format!("Corrupt sync state for '{entity}'"))?,
        error_message: row.get(4),
    }))
}

pub async fn store_checkpoint(client: &Client, entity: &str, cp: &SyncCheckpoint) -> Result<()> {
    let row_count = i64::try_from(cp.row_count).unwrap_or(i64::MAX);
    client
        .execute(
            "INSERT INTO sync_state (evidence, last_update, last_sync, row_count, status, error_msg) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (evidence) DO UPDATE SET \
             last_update = EXCLUDED.last_update, last_sync = EXCLUDED.last_sync, \
             row_count = EXCLUDED.row_count, status = EXCLUDED.status, \
             error_msg = EXCLUDED.error_msg",
            &[
                &entity,
                &cp.watermark,
                &cp.last_attempt,
                &row_count,
                &cp.status.as_str(),
                &cp.error_message,
            ],
        )
        .await
        .with_context(|| format!("Failed to write sync state for '{entity}'"))?;
    Ok(())
}
