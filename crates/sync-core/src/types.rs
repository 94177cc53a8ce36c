//! Field definitions reported by the source for each collection.
//!
//! The source describes its fields with an open set of type names. They are
//! folded into the closed [`LogicalType`] enumeration here, and each
//! destination derives its column types from that via [`ToDdl`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical type of a source field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Integer,
    Numeric,
    Date,
    DateTime,
    Boolean,
    String,
    /// Reference to a record of another collection (e.g. `code:CZK`).
    Relation,
    Unknown,
}

impl LogicalType {
    /// Map a source type name onto a logical type.
    ///
    /// Unrecognised names never fail; they become [`LogicalType::Unknown`],
    /// which destinations store as text.
    pub fn from_source_type(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "integer" => Self::Integer,
            "numeric" => Self::Numeric,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "logic" | "boolean" => Self::Boolean,
            "string" => Self::String,
            "relation" => Self::Relation,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Relation => "relation",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Definition of a single field of a source collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub logical_type: LogicalType,
    /// Maximum length for string-like fields, 0 when not reported.
    pub max_length: u32,
    pub mandatory: bool,
    pub read_only: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            max_length: 0,
            mandatory: false,
            read_only: false,
        }
    }
}

/// Trait for generating column types from [`LogicalType`].
///
/// Each destination implements this trait to pick the physical column type
/// used when schema evolution adds a column for a field.
pub trait ToDdl {
    /// Generate the DDL type name for the given logical type.
    fn to_ddl(&self, logical_type: LogicalType) -> String;
}
