//! Destination table creation and schema evolution.
//!
//! Tables are only ever extended: missing columns are added, existing columns
//! are never dropped or retyped.

use anyhow::{Context, Result};
use std::collections::HashMap;
use sync_core::{EntityDescriptor, FieldDescriptor, ToDdl};
use tokio_postgres::Client;

use crate::ddl::PostgreSQLDdl;
use crate::ident::{is_reserved, normalize_ident, quote_ident, RAW_DATA_COLUMN, SYNCED_AT_COLUMN};
use crate::value::ColumnType;

/// Existing columns of `table` in the current schema, keyed by name, with
/// their raw `data_type`.
pub async fn table_columns(client: &Client, table: &str) -> Result<HashMap<String, String>> {
    let rows = client
        .query(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1",
            &[&normalize_ident(table)],
        )
        .await
        .with_context(|| format!("Failed to list columns of table '{table}'"))?;

    Ok(rows
        .iter()
        .map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
        .collect())
}

/// Columns of `table` that upserts can bind, in a stable order.
pub async fn bindable_columns(client: &Client, table: &str) -> Result<Vec<(String, ColumnType)>> {
    let mut columns: Vec<(String, ColumnType)> = table_columns(client, table)
        .await?
        .into_iter()
        .filter_map(|(name, data_type)| match ColumnType::from_data_type(&data_type) {
            Some(t) => Some((name, t)),
            None => {
                tracing::debug!(table, column = %name, %data_type, "Skipping column of unsupported type");
                None
            }
        })
        .collect();
    columns.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(columns)
}

/// SQL creating an entity table with its base columns.
pub fn create_table_sql(table: &str, primary_key: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
         {} BIGINT PRIMARY KEY, \
         {RAW_DATA_COLUMN} JSONB, \
         {SYNCED_AT_COLUMN} TIMESTAMPTZ NOT NULL DEFAULT NOW())",
        quote_ident(table),
        quote_ident(primary_key),
    )
}

/// SQL adding one column for `field`.
pub fn add_column_sql(table: &str, field: &FieldDescriptor) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        quote_ident(table),
        quote_ident(&field.name),
        PostgreSQLDdl.to_ddl(field.logical_type)
    )
}

/// Fields that still need a column, deduplicated by destination name.
pub fn missing_fields<'a>(
    entity: &EntityDescriptor,
    fields: &'a [FieldDescriptor],
    existing: &HashMap<String, String>,
) -> Vec<&'a FieldDescriptor> {
    let primary_key = normalize_ident(&entity.primary_key);
    let mut seen = std::collections::HashSet::new();
    fields
        .iter()
        .filter(|f| {
            let column = normalize_ident(&f.name);
            column != primary_key
                && !is_reserved(&column)
                && !existing.contains_key(&column)
                && seen.insert(column)
        })
        .collect()
}

/// Create the entity table if needed and add a column for every new field.
///
/// Only the table creation is fatal. A failed column addition is logged and
/// skipped; the field's value still lands in the payload column.
pub async fn ensure_table(
    client: &Client,
    entity: &EntityDescriptor,
    fields: &[FieldDescriptor],
) -> Result<()> {
    let table = &entity.table;
    client
        .batch_execute(&create_table_sql(table, &entity.primary_key))
        .await
        .with_context(|| format!("Failed to create table '{table}'"))?;

    // Keeps `synced_at` range deletes off sequential scans
    let index = quote_ident(&format!("{}_synced_at_idx", normalize_ident(table)));
    if let Err(e) = client
        .batch_execute(&format!(
            "CREATE INDEX IF NOT EXISTS {index} ON {} ({SYNCED_AT_COLUMN})",
            quote_ident(table)
        ))
        .await
    {
        tracing::warn!(table, error = %e, "Failed to create synced_at index");
    }

    let existing = table_columns(client, table).await?;
    let missing = missing_fields(entity, fields, &existing);
    let mut added = 0usize;

    for field in missing {
        match client.batch_execute(&add_column_sql(table, field)).await {
            Ok(()) => {
                added += 1;
                tracing::debug!(table, column = %field.name, logical_type = %field.logical_type, "Added column");
            }
            Err(e) => {
                tracing::warn!(table, column = %field.name, error = %e, "Failed to add column, skipping");
            }
        }
    }

    if added > 0 {
        tracing::info!(table, added, "Evolved table schema");
    }
    Ok(())
}
