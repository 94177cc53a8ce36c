//! Identifier normalisation and quoting.

/// Column holding the complete source record.
pub const RAW_DATA_COLUMN: &str = "raw_data";

/// Column holding the time of the last upsert of a row.
pub const SYNCED_AT_COLUMN: &str = "synced_at";

/// Normalise a source-provided name into a destination identifier.
///
/// Hyphens become underscores; the result is otherwise kept verbatim,
/// case included.
pub fn normalize_ident(name: &str) -> String {
    name.replace('-', "_")
}

/// Normalise and double-quote an identifier for interpolation into SQL.
///
/// Embedded double quotes are escaped by doubling them.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", normalize_ident(name).replace('"', "\"\""))
}

/// True for the base columns every entity table has besides its primary key.
pub fn is_reserved(column: &str) -> bool {
    column == RAW_DATA_COLUMN || column == SYNCED_AT_COLUMN
}
