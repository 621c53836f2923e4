use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::config::LookupConfig;
use crate::model::{
    document_id_batches, Column, DocumentId, FilingRecord, ParcelKey, ParcelVariant, QueryTrace,
    Row, SoqlExpr, SoqlQuery, SortOrder, TraceStep, DOCUMENT_ID, MAX_BATCH_SIZE,
};
use crate::upstream::{Dataset, DatasetSource, UpstreamError};

/// Tunables for the legals -> master chain, injected at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupSettings {
    pub variants: Vec<ParcelVariant>,
    pub batch_size: usize,
    pub legals_row_cap: usize,
    pub direct_master_fallback: bool,
}

impl Default for LookupSettings {
    fn default() -> Self {
        Self::from(&LookupConfig::default())
    }
}

impl From<&LookupConfig> for LookupSettings {
    fn from(config: &LookupConfig) -> Self {
        Self {
            variants: config.variants.clone(),
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            legals_row_cap: config.legals_row_cap,
            direct_master_fallback: config.direct_master_fallback,
        }
    }
}

/// What the caller wants back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub limit: usize,
    pub order: SortOrder,
}

impl LookupRequest {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            order: SortOrder::default(),
        }
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LookupOutcome {
    pub records: Vec<FilingRecord>,
    pub trace: QueryTrace,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    /// Every attempt that could have produced an answer failed upstream
    #[error("All upstream queries failed: {message}")]
    ChainExhausted {
        status: Option<u16>,
        message: String,
        trace: QueryTrace,
    },
}

impl LookupError {
    pub fn trace(&self) -> &QueryTrace {
        match self {
            LookupError::ChainExhausted { trace, .. } => trace,
        }
    }
}

/// Result of a group of attempts against one dataset
#[derive(Debug, Default)]
struct Attempts {
    rows: Vec<Row>,
    any_succeeded: bool,
}

/// Resolves a parcel to its recorded filings: legals -> document ids ->
/// master rows, with ordered filter-variant fallbacks.
pub struct FilingLookup<S: DatasetSource> {
    source: Arc<S>,
    settings: LookupSettings,
}

impl<S: DatasetSource> FilingLookup<S> {
    pub fn new(source: Arc<S>, settings: LookupSettings) -> Self {
        Self { source, settings }
    }

    pub fn settings(&self) -> &LookupSettings {
        &self.settings
    }

    pub async fn lookup(
        &self,
        key: &ParcelKey,
        request: &LookupRequest,
    ) -> Result<LookupOutcome, LookupError> {
        let mut trace = QueryTrace::new();

        // Step 1: legals, one variant at a time until some ids come back
        let legals = self.legals_document_ids(key, &mut trace).await;

        // Step 2: the legals dataset repeats ids once per legal segment
        let ids: Vec<DocumentId> = legals
            .rows
            .iter()
            .filter_map(DocumentId::from_row)
            .unique()
            .collect();

        log::debug!("parcel {}: {} distinct document ids", key, ids.len());

        // Step 3: hydrate ids from master in bounded batches
        let batches = self.master_by_ids(&ids, request, &mut trace).await;
        let mut rows = batches.rows;
        let mut direct_succeeded = false;

        // Step 4: direct parcel filter against master when the join yielded nothing
        if rows.is_empty() && self.settings.direct_master_fallback {
            let direct = self.master_by_parcel(key, request, &mut trace).await;
            direct_succeeded = direct.any_succeeded;
            rows = direct.rows;
        }

        // Known ids with no hydrated rows is only an answer if a batch query succeeded
        let conclusive = if ids.is_empty() {
            legals.any_succeeded || direct_succeeded
        } else {
            batches.any_succeeded
        };

        if rows.is_empty() && !conclusive {
            return Err(exhausted(trace));
        }

        // Step 5: dedupe, sort, truncate
        let records = finish(rows, request);
        log::info!(
            "parcel {}: {} filings after {} upstream queries",
            key,
            records.len(),
            trace.len()
        );

        Ok(LookupOutcome { records, trace })
    }

    /// Master dataset only, filtered by parcel fields
    pub async fn direct_master(
        &self,
        key: &ParcelKey,
        request: &LookupRequest,
    ) -> Result<LookupOutcome, LookupError> {
        let mut trace = QueryTrace::new();
        let master = self.master_by_parcel(key, request, &mut trace).await;

        if master.rows.is_empty() && !master.any_succeeded {
            return Err(exhausted(trace));
        }

        Ok(LookupOutcome {
            records: finish(master.rows, request),
            trace,
        })
    }

    async fn legals_document_ids(&self, key: &ParcelKey, trace: &mut QueryTrace) -> Attempts {
        let select = vec![Column::from_static(DOCUMENT_ID)];
        let queries = self.settings.variants.iter().map(|variant| {
            let query = SoqlQuery::new()
                .select(select.clone())
                .filter(variant.filter(key))
                .limit(self.settings.legals_row_cap);
            (format!("legals:{}", variant), query)
        });

        self.first_non_empty(Dataset::Legals, queries, trace).await
    }

    async fn master_by_parcel(
        &self,
        key: &ParcelKey,
        request: &LookupRequest,
        trace: &mut QueryTrace,
    ) -> Attempts {
        let queries = self.settings.variants.iter().map(|variant| {
            let query = SoqlQuery::new()
                .filter(variant.filter(key))
                .order(request.order.clone())
                .limit(request.limit);
            (format!("master_direct:{}", variant), query)
        });

        self.first_non_empty(Dataset::Master, queries, trace).await
    }

    async fn master_by_ids(
        &self,
        ids: &[DocumentId],
        request: &LookupRequest,
        trace: &mut QueryTrace,
    ) -> Attempts {
        let mut attempts = Attempts::default();

        for (index, filter) in document_id_batches(ids, self.settings.batch_size)
            .into_iter()
            .enumerate()
        {
            let batch_len = match &filter {
                SoqlExpr::In { values, .. } => values.len(),
                _ => 0,
            };
            // A single batch must be able to return every one of its ids
            let query = SoqlQuery::new()
                .filter(filter)
                .order(request.order.clone())
                .limit(batch_len.max(request.limit));

            let step = format!("master:batch{}", index + 1);
            if let Ok(rows) = self.attempt(Dataset::Master, step, &query, trace).await {
                attempts.any_succeeded = true;
                attempts.rows.extend(rows);
            }
        }

        attempts
    }

    /// Run queries in order and stop at the first one returning rows
    async fn first_non_empty(
        &self,
        dataset: Dataset,
        queries: impl Iterator<Item = (String, SoqlQuery)>,
        trace: &mut QueryTrace,
    ) -> Attempts {
        let mut attempts = Attempts::default();

        for (step, query) in queries {
            if let Ok(rows) = self.attempt(dataset, step, &query, trace).await {
                attempts.any_succeeded = true;
                if !rows.is_empty() {
                    attempts.rows = rows;
                    break;
                }
            }
        }

        attempts
    }

    /// One upstream call; failures are traced and count as zero rows
    async fn attempt(
        &self,
        dataset: Dataset,
        step: String,
        query: &SoqlQuery,
        trace: &mut QueryTrace,
    ) -> Result<Vec<Row>, UpstreamError> {
        let result = self.source.query(dataset, query).await;

        let (count, status, error) = match &result {
            Ok(rows) => (rows.len(), None, None),
            Err(e) => {
                log::warn!("{} failed: {}", step, e);
                (0, e.status(), Some(e.to_string()))
            }
        };

        trace.push(TraceStep {
            step,
            dataset: dataset.label().to_string(),
            filter: query.where_clause(),
            count,
            status,
            error,
        });

        result
    }
}

fn exhausted(trace: QueryTrace) -> LookupError {
    let (status, message) = match trace.last_failure() {
        Some(step) => (
            step.status,
            step.error.clone().unwrap_or_else(|| "upstream failure".to_string()),
        ),
        None => (None, "no upstream query was attempted".to_string()),
    };
    LookupError::ChainExhausted {
        status,
        message,
        trace,
    }
}

fn finish(rows: Vec<Row>, request: &LookupRequest) -> Vec<FilingRecord> {
    let mut seen = HashSet::new();
    let mut records: Vec<FilingRecord> = rows
        .into_iter()
        .map(FilingRecord::from)
        .filter(|record| match record.document_id() {
            Some(id) => seen.insert(id),
            None => true,
        })
        .collect();

    records.sort_by(|a, b| a.compare_by(b, &request.order));
    records.truncate(request.limit);
    records
}
