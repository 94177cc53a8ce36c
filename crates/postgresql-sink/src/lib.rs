//! PostgreSQL destination for flexibee-sync.
//!
//! Each entity is mirrored into its own table with three base columns (the
//! integer primary key, a `raw_data` JSONB payload holding the full record,
//! and `synced_at`) plus one typed column per known source field. Sync
//! bookkeeping lives in `sync_state` and `cleanup_log`.

pub mod cleanup;
pub mod ddl;
pub mod ident;
pub mod migrations;
pub mod schema;
pub mod store;
pub mod sync_state;
pub mod upsert;
pub mod value;

pub use ddl::PostgreSQLDdl;
pub use ident::{normalize_ident, quote_ident};
pub use store::PostgresStore;
pub use value::{ColumnType, PostgreSQLValue};
