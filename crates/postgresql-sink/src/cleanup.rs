//! Row deletion: retention cleanup, deletes by key and the cleanup log.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sync_core::CleanupRecord;
use tokio_postgres::Client;

use crate::ident::{normalize_ident, quote_ident, SYNCED_AT_COLUMN};

/// SQL deleting at most `$2` rows synced strictly before `$1`.
pub fn cleanup_batch_sql(table: &str) -> String {
    let table = quote_ident(table);
    format!(
        "DELETE FROM {table} WHERE ctid IN \
         (SELECT ctid FROM {table} WHERE {SYNCED_AT_COLUMN} < $1 LIMIT $2)"
    )
}

/// Delete rows older than `cutoff` in rounds of at most `batch_size` rows.
///
/// Rows synced exactly at `cutoff` are kept. Returns the total deleted.
pub async fn cleanup_older_than(
    client: &Client,
    table: &str,
    cutoff: DateTime<Utc>,
    batch_size: u64,
) -> Result<u64> {
    let batch_size = batch_size.max(1);
    let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);
    let sql = cleanup_batch_sql(table);
    let mut total = 0u64;
    let mut rounds = 0u32;

    loop {
        let deleted = client
            .execute(&sql, &[&cutoff, &limit])
            .await
            .with_context(|| format!("Failed to delete old rows from '{table}'"))?;
        total += deleted;
        rounds += 1;
        if deleted < batch_size {
            break;
        }
    }

    tracing::debug!(table, total, rounds, %cutoff, "Cleanup rounds finished");
    Ok(total)
}

/// Delete rows whose primary key is in `ids`.
pub async fn delete_records(
    client: &Client,
    table: &str,
    primary_key: &str,
    ids: &[i64],
) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "DELETE FROM {} WHERE {} = ANY($1)",
        quote_ident(table),
        quote_ident(primary_key)
    );
    let ids = ids.to_vec();
    client
        .execute(&sql, &[&ids])
        .await
        .with_context(|| format!("Failed to delete rows from '{}'", normalize_ident(table)))
}

/// Append an entry to `cleanup_log`.
pub async fn log_cleanup(client: &Client, record: &CleanupRecord) -> Result<()> {
    let rows_deleted = i64::try_from(record.rows_deleted).unwrap_or(i64::MAX);
    client
        .execute(
            "INSERT INTO cleanup_log (evidence, rows_deleted, oldest_kept) VALUES ($1, $2, $3)",
            &[&record.entity, &rows_deleted, &record.oldest_kept],
        )
        .await
        .context("Failed to write cleanup log")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_batch_sql_is_strict() {
        assert_eq!(
            cleanup_batch_sql("flexibee_faktura-vydana"),
            "DELETE FROM \"flexibee_faktura_vydana\" WHERE ctid IN \
             (SELECT ctid FROM \"flexibee_faktura_vydana\" WHERE synced_at < $1 LIMIT $2)"
        );
    }
}
