//! Insert-or-replace of source records.
//!
//! Every bindable column of the table is written on each upsert, so a record
//! replaces the stored row completely: fields missing from the record become
//! NULL. The complete record always goes to `raw_data`.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use sync_core::Record;
use tokio_postgres::{types::ToSql, Client};

use crate::ident::{is_reserved, normalize_ident, quote_ident, RAW_DATA_COLUMN, SYNCED_AT_COLUMN};
use crate::schema::bindable_columns;
use crate::value::{ColumnType, PostgreSQLValue};

/// Upsert statement for one table and the columns it binds.
#[derive(Debug, Clone)]
pub struct UpsertPlan {
    pub sql: String,
    primary_key: String,
    primary_key_type: ColumnType,
    /// Typed columns in parameter order, after the primary key
    columns: Vec<(String, ColumnType)>,
}

impl UpsertPlan {
    /// Build the plan from the table's bindable columns.
    pub fn new(table: &str, primary_key: &str, columns: &[(String, ColumnType)]) -> Result<Self> {
        let pk_column = normalize_ident(primary_key);
        let primary_key_type = columns
            .iter()
            .find(|(name, _)| *name == pk_column)
            .map(|(_, t)| *t)
            .ok_or_else(|| anyhow!("Table '{table}' has no primary key column '{pk_column}'"))?;

        let typed: Vec<(String, ColumnType)> = columns
            .iter()
            .filter(|(name, _)| *name != pk_column && !is_reserved(name))
            .cloned()
            .collect();

        let mut insert_columns = vec![quote_ident(&pk_column)];
        insert_columns.extend(typed.iter().map(|(name, _)| quote_ident(name)));
        insert_columns.push(RAW_DATA_COLUMN.to_string());
        insert_columns.push(SYNCED_AT_COLUMN.to_string());

        // $1 is the key, then one per typed column, then raw_data
        let mut placeholders: Vec<String> = (1..=typed.len() + 2).map(|i| format!("${i}")).collect();
        placeholders.push("NOW()".to_string());

        let updates: Vec<String> = insert_columns[1..]
            .iter()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            quote_ident(table),
            insert_columns.join(", "),
            placeholders.join(", "),
            quote_ident(&pk_column),
            updates.join(", ")
        );

        Ok(Self {
            sql,
            primary_key: primary_key.to_string(),
            primary_key_type,
            columns: typed,
        })
    }

    /// Parameters for one record, or None when its primary key is missing or
    /// not an integer.
    pub fn params(&self, record: &Record) -> Option<Vec<Box<dyn ToSql + Sync + Send>>> {
        let by_column: HashMap<String, &serde_json::Value> = record
            .fields()
            .map(|(name, value)| (normalize_ident(name), value))
            .collect();

        let key = PostgreSQLValue::from_json(record.get(&self.primary_key), self.primary_key_type);
        if key.is_null() {
            return None;
        }

        let mut params: Vec<Box<dyn ToSql + Sync + Send>> = Vec::with_capacity(self.columns.len() + 2);
        params.push(key.into_boxed());
        for (name, column_type) in &self.columns {
            let value = PostgreSQLValue::from_json(by_column.get(name).copied(), *column_type);
            params.push(value.into_boxed());
        }
        params.push(Box::new(record.payload()));
        Some(params)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Upsert `records` into `table` one statement per record.
///
/// Records without a usable primary key and records whose write fails are
/// logged and skipped; only a failure to plan or prepare the statement fails
/// the batch.
pub async fn upsert_records(
    client: &Client,
    table: &str,
    records: &[Record],
    primary_key: &str,
) -> Result<u64> {
    if records.is_empty() {
        return Ok(0);
    }

    let columns = bindable_columns(client, table).await?;
    let plan = UpsertPlan::new(table, primary_key, &columns)?;
    let statement = client
        .prepare(&plan.sql)
        .await
        .with_context(|| format!("Failed to prepare upsert for table '{table}'"))?;

    let mut written = 0u64;
    let mut failed = 0u64;

    for record in records {
        let Some(params) = plan.params(record) else {
            tracing::warn!(table, primary_key, "Skipping record without a usable primary key");
            continue;
        };
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        match client.execute(&statement, &param_refs).await {
            Ok(_) => written += 1,
            Err(e) => {
                tracing::warn!(
                    table,
                    id = ?record.get(primary_key),
                    error = %e,
                    "Failed to upsert record, skipping"
                );
                failed += 1;
            }
        }
    }

    tracing::debug!(table, written, failed, "Upserted batch");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns() -> Vec<(String, ColumnType)> {
        vec![
            ("datVyst".to_string(), ColumnType::Date),
            ("id".to_string(), ColumnType::BigInt),
            ("kod".to_string(), ColumnType::Text),
            ("raw_data".to_string(), ColumnType::Jsonb),
            ("synced_at".to_string(), ColumnType::TimestampTz),
        ]
    }

    #[test]
    fn test_upsert_sql_replaces_every_column() {
        let plan = UpsertPlan::new("flexibee_faktura_vydana", "id", &columns()).unwrap();
        assert_eq!(
            plan.sql,
            "INSERT INTO \"flexibee_faktura_vydana\" (\"id\", \"datVyst\", \"kod\", raw_data, synced_at) \
             VALUES ($1, $2, $3, $4, NOW()) ON CONFLICT (\"id\") DO UPDATE SET \
             \"datVyst\" = EXCLUDED.\"datVyst\", \"kod\" = EXCLUDED.\"kod\", \
             raw_data = EXCLUDED.raw_data, synced_at = EXCLUDED.synced_at"
        );
        assert_eq!(plan.column_count(), 2);
    }

    #[test]
    fn test_plan_requires_primary_key_column() {
        let cols = vec![("kod".to_string(), ColumnType::Text)];
        assert!(UpsertPlan::new("t", "id", &cols).is_err());
    }

    #[test]
    fn test_params_for_string_key() {
        let plan = UpsertPlan::new("t", "id", &columns()).unwrap();
        let record = Record::try_from(json!({ "id": "17", "kod": "F1", "extra": true })).unwrap();
        let params = plan.params(&record).unwrap();
        // key, datVyst, kod, raw_data
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn test_params_skip_missing_or_non_integer_key() {
        let plan = UpsertPlan::new("t", "id", &columns()).unwrap();
        let missing = Record::try_from(json!({ "kod": "F1" })).unwrap();
        let garbled = Record::try_from(json!({ "id": "code:F1" })).unwrap();
        assert!(plan.params(&missing).is_none());
        assert!(plan.params(&garbled).is_none());
    }
}
