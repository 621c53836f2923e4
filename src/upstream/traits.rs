use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::model::{Row, SoqlQuery};

/// Datasets reachable through the open-data API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// Parcel -> recorded document ids
    Legals,
    /// Filing details keyed by document id
    Master,
    /// DOB permit issuance
    Permits,
}

impl Dataset {
    pub fn label(&self) -> &'static str {
        match self {
            Dataset::Legals => "legals",
            Dataset::Master => "master",
            Dataset::Permits => "permits",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failure of a single upstream call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Read-only access to the tabular open-data datasets
#[async_trait::async_trait]
pub trait DatasetSource: Send + Sync {
    /// Issue one GET with raw query parameters
    async fn fetch(
        &self,
        dataset: Dataset,
        params: &[(String, String)],
    ) -> Result<Vec<Row>, UpstreamError>;

    /// Issue one GET and return the JSON body untouched, for pass-through routes
    async fn fetch_json(
        &self,
        dataset: Dataset,
        params: &[(String, String)],
    ) -> Result<Value, UpstreamError> {
        let rows = self.fetch(dataset, params).await?;
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }

    async fn query(&self, dataset: Dataset, query: &SoqlQuery) -> Result<Vec<Row>, UpstreamError> {
        self.fetch(dataset, &query.to_params()).await
    }
}
