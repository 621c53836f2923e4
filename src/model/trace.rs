use serde::{Deserialize, Serialize};

/// One upstream attempt, as reported in debug output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step: String,
    pub dataset: String,
    #[serde(rename = "where")]
    pub filter: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceStep {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Ordered log of the upstream attempts made for one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryTrace {
    pub steps: Vec<TraceStep>,
}

impl QueryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: TraceStep) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn last_failure(&self) -> Option<&TraceStep> {
        self.steps.iter().rev().find(|s| !s.succeeded())
    }
}
