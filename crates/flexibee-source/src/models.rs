//! Wire models for Flexibee JSON responses.
//!
//! Flexibee is inconsistent about scalar encoding: counts and flags arrive as
//! `"20"`/`20` and `"true"`/`true` depending on the endpoint and version.
//! [`FlexInt`] and [`FlexBool`] accept either form.

use serde::Deserialize;
use serde_json::{Map, Value};
use sync_core::{FieldDescriptor, LogicalType, Page, Record};

use crate::SourceError;

/// Integer that may be encoded as a number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexInt {
    Number(i64),
    Text(String),
    Other(Value),
}

impl FlexInt {
    pub fn value(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Other(_) => None,
        }
    }
}

/// Boolean that may be encoded as a bool or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexBool {
    Bool(bool),
    Text(String),
    Other(Value),
}

impl FlexBool {
    pub fn value(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => s.trim().eq_ignore_ascii_case("true"),
            Self::Other(_) => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordsEnvelope {
    winstrom: Winstrom,
}

#[derive(Debug, Deserialize)]
struct Winstrom {
    #[serde(rename = "@rowCount", default)]
    row_count: Option<FlexInt>,
    /// The records keyed by evidence slug, plus `@version` and friends
    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Decode a records response for `entity`.
///
/// A missing records key yields an empty page; a missing or garbled
/// `@rowCount` leaves the total unknown. Array elements that are not objects
/// are dropped.
pub fn parse_records(entity: &str, body: &str) -> Result<Page, SourceError> {
    let envelope: RecordsEnvelope = serde_json::from_str(body)?;
    let Winstrom {
        row_count,
        mut rest,
        ..
    } = envelope.winstrom;

    let total = row_count
        .and_then(|c| c.value())
        .and_then(|n| u64::try_from(n).ok());

    let records = match rest.remove(entity) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match Record::try_from(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::debug!(entity, error = %e, "Dropping non-object record");
                    None
                }
            })
            .collect(),
        // a single record is sometimes returned unwrapped
        Some(Value::Object(map)) => vec![Record::from(map)],
        _ => Vec::new(),
    };

    Ok(Page::new(records, total))
}

#[derive(Debug, Deserialize)]
struct PropertiesEnvelope {
    #[serde(default)]
    properties: Option<Properties>,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(default)]
    property: Vec<Property>,
}

/// One entry of a `properties.json` listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Property {
    #[serde(rename = "propertyName")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "maxLength", default)]
    pub max_length: Option<FlexInt>,
    #[serde(default)]
    pub mandatory: Option<FlexBool>,
    #[serde(rename = "isReadOnly", default)]
    pub read_only: Option<FlexBool>,
}

impl From<Property> for FieldDescriptor {
    fn from(p: Property) -> Self {
        let max_length = p
            .max_length
            .and_then(|m| m.value())
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        Self {
            logical_type: LogicalType::from_source_type(&p.kind),
            name: p.name,
            max_length,
            mandatory: p.mandatory.is_some_and(|b| b.value()),
            read_only: p.read_only.is_some_and(|b| b.value()),
        }
    }
}

/// Decode a `properties.json` response into field descriptors.
pub fn parse_properties(body: &str) -> Result<Vec<FieldDescriptor>, SourceError> {
    let envelope: PropertiesEnvelope = serde_json::from_str(body)?;
    Ok(envelope
        .properties
        .map(|p| p.property.into_iter().map(FieldDescriptor::from).collect())
        .unwrap_or_default())
}
