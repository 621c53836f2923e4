use serde::Serialize;

use crate::model::{FilingRecord, QueryTrace};

/// Response body of a filings lookup: the bare array by default, or the
/// array wrapped together with the upstream trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FilingsBody {
    Records(Vec<FilingRecord>),
    Debug {
        debug: QueryTrace,
        results: Vec<FilingRecord>,
    },
}

impl FilingsBody {
    pub fn records(&self) -> &[FilingRecord] {
        match self {
            FilingsBody::Records(records) => records,
            FilingsBody::Debug { results, .. } => results,
        }
    }
}

pub fn shape(records: Vec<FilingRecord>, trace: QueryTrace, debug: bool) -> FilingsBody {
    if debug {
        FilingsBody::Debug {
            debug: trace,
            results: records,
        }
    } else {
        FilingsBody::Records(records)
    }
}
