use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::{DocumentId, ParcelKey};

/// Hard ceiling on the number of ids in one IN-list
pub const MAX_BATCH_SIZE: usize = 80;

pub const DOCUMENT_ID: &str = "document_id";
pub const RECORDED_DATETIME: &str = "recorded_datetime";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SoqlError {
    #[error("Invalid column name '{0}'")]
    InvalidColumn(String),
    #[error("Invalid sort order '{0}', expected '<column> [ASC|DESC]'")]
    InvalidOrder(String),
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A column reference that is known to be a plain identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column(String);

impl Column {
    pub fn new(name: &str) -> Result<Self, SoqlError> {
        if is_identifier(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(SoqlError::InvalidColumn(name.to_string()))
        }
    }

    /// Column names written into the source
    pub fn from_static(name: &'static str) -> Self {
        debug_assert!(is_identifier(name));
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Literal on the right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoqlValue {
    Number(u64),
    Text(String),
}

impl SoqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SoqlValue::Text(value.into())
    }
}

impl fmt::Display for SoqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoqlValue::Number(n) => write!(f, "{}", n),
            SoqlValue::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// Filter expression rendered into a `$where` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoqlExpr {
    Eq { column: Column, value: SoqlValue },
    In { column: Column, values: Vec<SoqlValue> },
    And(Vec<SoqlExpr>),
    Or(Vec<SoqlExpr>),
}

impl SoqlExpr {
    pub fn equals(column: &'static str, value: SoqlValue) -> Self {
        SoqlExpr::Eq {
            column: Column::from_static(column),
            value,
        }
    }

    pub fn in_list(column: &'static str, values: Vec<SoqlValue>) -> Self {
        SoqlExpr::In {
            column: Column::from_static(column),
            values,
        }
    }

    fn is_combinator(&self) -> bool {
        matches!(self, SoqlExpr::And(items) | SoqlExpr::Or(items) if items.len() > 1)
    }

    fn write_joined(f: &mut fmt::Formatter<'_>, items: &[SoqlExpr], op: &str) -> fmt::Result {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", op)?;
            }
            if item.is_combinator() {
                write!(f, "({})", item)?;
            } else {
                write!(f, "{}", item)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for SoqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoqlExpr::Eq { column, value } => write!(f, "{}={}", column, value),
            SoqlExpr::In { column, values } => {
                write!(f, "{} in (", column)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str(")")
            }
            SoqlExpr::And(items) => Self::write_joined(f, items, "AND"),
            SoqlExpr::Or(items) => Self::write_joined(f, items, "OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub column: Column,
    pub descending: bool,
}

impl SortOrder {
    pub fn descending(column: Column) -> Self {
        Self {
            column,
            descending: true,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, SoqlError> {
        let mut parts = raw.split_whitespace();
        let column = parts
            .next()
            .ok_or_else(|| SoqlError::InvalidOrder(raw.to_string()))?;
        let column = Column::new(column).map_err(|_| SoqlError::InvalidOrder(raw.to_string()))?;

        let descending = match parts.next().map(|d| d.to_ascii_uppercase()) {
            None => false,
            Some(d) if d == "ASC" => false,
            Some(d) if d == "DESC" => true,
            Some(_) => return Err(SoqlError::InvalidOrder(raw.to_string())),
        };

        if parts.next().is_some() {
            return Err(SoqlError::InvalidOrder(raw.to_string()));
        }

        Ok(Self { column, descending })
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::descending(Column::from_static(RECORDED_DATETIME))
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.column,
            if self.descending { "DESC" } else { "ASC" }
        )
    }
}

/// One request against a tabular dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoqlQuery {
    pub select: Vec<Column>,
    pub filter: Option<SoqlExpr>,
    pub order: Option<SortOrder>,
    pub limit: Option<usize>,
}

impl SoqlQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, columns: Vec<Column>) -> Self {
        self.select = columns;
        self
    }

    pub fn filter(mut self, filter: SoqlExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Rendered `$where` text, used for tracing
    pub fn where_clause(&self) -> String {
        self.filter.as_ref().map(|f| f.to_string()).unwrap_or_default()
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if !self.select.is_empty() {
            let select = self
                .select
                .iter()
                .map(Column::as_str)
                .collect::<Vec<_>>()
                .join(",");
            params.push(("$select".to_string(), select));
        }
        if let Some(filter) = &self.filter {
            params.push(("$where".to_string(), filter.to_string()));
        }
        if let Some(order) = &self.order {
            params.push(("$order".to_string(), order.to_string()));
        }
        if let Some(limit) = self.limit {
            params.push(("$limit".to_string(), limit.to_string()));
        }
        params
    }
}

/// Textual representation tried when matching a parcel against a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelVariant {
    /// `borough=1 AND block=1336 AND lot=66`
    Numeric,
    /// `borough='1' AND block='1336' AND lot='66'`
    PlainText,
    /// `borough='1' AND block='01336' AND lot='0066'`
    ZeroPadded,
    /// Every representation at once, OR-ed per column
    Mixed,
}

impl ParcelVariant {
    pub const DEFAULT_ORDER: [ParcelVariant; 4] = [
        ParcelVariant::Numeric,
        ParcelVariant::PlainText,
        ParcelVariant::ZeroPadded,
        ParcelVariant::Mixed,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ParcelVariant::Numeric => "numeric",
            ParcelVariant::PlainText => "plain_text",
            ParcelVariant::ZeroPadded => "zero_padded",
            ParcelVariant::Mixed => "mixed",
        }
    }

    pub fn filter(&self, key: &ParcelKey) -> SoqlExpr {
        let borough = key.borough.code() as u64;
        let block = key.block as u64;
        let lot = key.lot as u64;

        match self {
            ParcelVariant::Numeric => SoqlExpr::And(vec![
                SoqlExpr::equals("borough", SoqlValue::Number(borough)),
                SoqlExpr::equals("block", SoqlValue::Number(block)),
                SoqlExpr::equals("lot", SoqlValue::Number(lot)),
            ]),
            ParcelVariant::PlainText => SoqlExpr::And(vec![
                SoqlExpr::equals("borough", SoqlValue::text(borough.to_string())),
                SoqlExpr::equals("block", SoqlValue::text(block.to_string())),
                SoqlExpr::equals("lot", SoqlValue::text(lot.to_string())),
            ]),
            ParcelVariant::ZeroPadded => SoqlExpr::And(vec![
                SoqlExpr::equals("borough", SoqlValue::text(borough.to_string())),
                SoqlExpr::equals("block", SoqlValue::text(key.padded_block())),
                SoqlExpr::equals("lot", SoqlValue::text(key.padded_lot())),
            ]),
            ParcelVariant::Mixed => SoqlExpr::And(vec![
                SoqlExpr::Or(vec![
                    SoqlExpr::equals("borough", SoqlValue::Number(borough)),
                    SoqlExpr::equals("borough", SoqlValue::text(borough.to_string())),
                    SoqlExpr::equals("borough", SoqlValue::text(key.borough.name())),
                ]),
                SoqlExpr::Or(vec![
                    SoqlExpr::equals("block", SoqlValue::Number(block)),
                    SoqlExpr::equals("block", SoqlValue::text(block.to_string())),
                    SoqlExpr::equals("block", SoqlValue::text(key.padded_block())),
                ]),
                SoqlExpr::Or(vec![
                    SoqlExpr::equals("lot", SoqlValue::Number(lot)),
                    SoqlExpr::equals("lot", SoqlValue::text(lot.to_string())),
                    SoqlExpr::equals("lot", SoqlValue::text(key.padded_lot())),
                ]),
            ]),
        }
    }
}

impl fmt::Display for ParcelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Split ids into `document_id in (...)` filters of at most `batch_size` ids.
///
/// `batch_size` is clamped to `1..=MAX_BATCH_SIZE`. No ids, no filters.
pub fn document_id_batches(ids: &[DocumentId], batch_size: usize) -> Vec<SoqlExpr> {
    let size = batch_size.clamp(1, MAX_BATCH_SIZE);
    ids.chunks(size)
        .map(|chunk| {
            SoqlExpr::in_list(
                DOCUMENT_ID,
                chunk
                    .iter()
                    .map(|id| SoqlValue::text(id.as_str()))
                    .collect(),
            )
        })
        .collect()
}
