use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

use crate::model::soql::{SortOrder, DOCUMENT_ID, RECORDED_DATETIME};

/// A raw row returned by a tabular dataset
pub type Row = Map<String, Value>;

/// Opaque join key between the legals and master datasets
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the `document_id` column of a row; blank values are skipped
    pub fn from_row(row: &Row) -> Option<Self> {
        match row.get(DOCUMENT_ID)? {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A master-dataset record, passed through untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilingRecord(pub Row);

impl FilingRecord {
    pub fn document_id(&self) -> Option<DocumentId> {
        DocumentId::from_row(&self.0)
    }

    pub fn field(&self, column: &str) -> Option<&Value> {
        self.0.get(column).filter(|v| !v.is_null())
    }

    pub fn recorded_at(&self) -> Option<NaiveDateTime> {
        self.field(RECORDED_DATETIME).and_then(parse_timestamp)
    }

    /// Compare two records by `order`; records missing the column sort last
    pub fn compare_by(&self, other: &Self, order: &SortOrder) -> Ordering {
        let column = order.column.as_str();
        match (self.field(column), other.field(column)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let ordering = compare_values(a, b);
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        }
    }
}

impl From<Row> for FilingRecord {
    fn from(row: Row) -> Self {
        Self(row)
    }
}

/// Socrata floating timestamps, with or without fractional seconds
pub fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Chronological for timestamps, numeric for numbers, lexical otherwise
fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(a), Some(b)) = (parse_timestamp(a), parse_timestamp(b)) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (as_number(a), as_number(b)) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => a.to_string().cmp(&b.to_string()),
    }
}
