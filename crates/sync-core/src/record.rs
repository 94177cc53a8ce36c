//! Records and pages produced by the source.
//!
//! A [`Record`] keeps the complete original structure of one source record
//! so that it can be stored verbatim as a payload, while stores project the
//! fields they know about onto typed columns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One source record: an ordered mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Iterate over fields in source order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The full record as a JSON object, unknown fields included.
    pub fn payload(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = anyhow::Error;

    fn try_from(value: Value) -> anyhow::Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(anyhow::anyhow!("expected a JSON object record, got: {other}")),
        }
    }
}

/// One bounded batch of records returned by a single fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Total number of matching records, when the source reported it.
    pub total: Option<u64>,
    pub records: Vec<Record>,
}

impl Page {
    pub fn new(records: Vec<Record>, total: Option<u64>) -> Self {
        Self { total, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
