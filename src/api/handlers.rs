use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::logic::{shape, FilingLookup, FilingsBody, LookupError, LookupRequest, LookupSettings};
use crate::model::{ParcelInput, ParcelKey, QueryTrace, SortOrder};
use crate::upstream::{
    AddressQuery, Dataset, DatasetSource, GeoclientBody, GeoclientClient, GeoclientError,
    UpstreamError,
};

/// Name reported by the filings ping
pub const FILINGS_HANDLER: &str = "parcel-filings";

/// Shared, read-only per-process state; nothing here changes between requests
pub struct ServiceState<S: DatasetSource> {
    pub source: Arc<S>,
    pub filings: FilingLookup<S>,
    pub geoclient: GeoclientClient,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl<S: DatasetSource> ServiceState<S> {
    pub fn new(source: Arc<S>, config: &AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            filings: FilingLookup::new(source.clone(), LookupSettings::from(&config.lookup)),
            source,
            geoclient: GeoclientClient::new(&config.geoclient)?,
            default_limit: config.lookup.default_limit,
            max_limit: config.lookup.max_limit,
        })
    }
}

pub type AppState<S> = Arc<ServiceState<S>>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Error body; `error` is always true so callers can branch on it
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<QueryTrace>,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: true,
            message: message.to_string(),
            status: None,
            debug: None,
        }
    }
}

fn error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

fn lookup_error(err: LookupError, debug: bool) -> ApiError {
    let trace = debug.then(|| err.trace().clone());
    let LookupError::ChainExhausted {
        status, message, ..
    } = err;

    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: true,
            message,
            status,
            debug: trace,
        }),
    )
}

fn bad_query(rejection: QueryRejection) -> ApiError {
    error(StatusCode::BAD_REQUEST, &rejection.body_text())
}

/// Flags count as set unless empty or an explicit "off" value
fn is_truthy(value: Option<&str>) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => false,
        Some(v) => !(v.is_empty() || v == "0" || v == "false" || v == "no"),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct FilingsQuery {
    pub bbl: Option<String>,
    #[serde(alias = "b", alias = "boro")]
    pub borough: Option<String>,
    #[serde(alias = "bl")]
    pub block: Option<String>,
    #[serde(alias = "lt")]
    pub lot: Option<String>,
    #[serde(rename = "$limit")]
    pub limit: Option<String>,
    #[serde(rename = "$order")]
    pub order: Option<String>,
    pub debug: Option<String>,
    pub ping: Option<String>,
}

impl FilingsQuery {
    pub fn parcel_input(&self) -> ParcelInput {
        ParcelInput {
            bbl: self.bbl.clone(),
            borough: self.borough.clone(),
            block: self.block.clone(),
            lot: self.lot.clone(),
        }
    }

    pub fn debug(&self) -> bool {
        is_truthy(self.debug.as_deref())
    }

    pub fn ping(&self) -> bool {
        is_truthy(self.ping.as_deref())
    }

    pub fn parcel(&self) -> Result<ParcelKey, ApiError> {
        self.parcel_input()
            .resolve()
            .map_err(|e| error(StatusCode::BAD_REQUEST, &e.to_string()))
    }

    /// `$limit` defaults to `default_limit` and is clamped to `1..=max_limit`
    pub fn lookup_request(&self, default_limit: usize, max_limit: usize) -> Result<LookupRequest, ApiError> {
        let limit = match self.limit.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            None => default_limit,
            Some(raw) => raw.parse::<usize>().map_err(|_| {
                error(
                    StatusCode::BAD_REQUEST,
                    &format!("Invalid $limit '{}', expected a positive integer", raw),
                )
            })?,
        };

        let order = match self.order.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            None => SortOrder::default(),
            Some(raw) => SortOrder::parse(raw)
                .map_err(|e| error(StatusCode::BAD_REQUEST, &e.to_string()))?,
        };

        Ok(LookupRequest::new(limit.clamp(1, max_limit.max(1))).with_order(order))
    }
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub ok: bool,
    pub handler: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FilingsResponse {
    Ping(PingResponse),
    Filings(FilingsBody),
}

/// Parcel -> legals -> master lookup
pub async fn get_parcel_filings<S: DatasetSource>(
    State(state): State<AppState<S>>,
    query: Result<Query<FilingsQuery>, QueryRejection>,
) -> Result<Json<FilingsResponse>, ApiError> {
    let Query(query) = query.map_err(bad_query)?;

    if query.ping() {
        return Ok(Json(FilingsResponse::Ping(PingResponse {
            ok: true,
            handler: FILINGS_HANDLER.to_string(),
        })));
    }

    let key = query.parcel()?;
    let request = query.lookup_request(state.default_limit, state.max_limit)?;
    let debug = query.debug();

    let outcome = state
        .filings
        .lookup(&key, &request)
        .await
        .map_err(|e| lookup_error(e, debug))?;

    Ok(Json(FilingsResponse::Filings(shape(
        outcome.records,
        outcome.trace,
        debug,
    ))))
}

/// Master dataset filtered by parcel fields, skipping the legals join
pub async fn get_master_by_parcel<S: DatasetSource>(
    State(state): State<AppState<S>>,
    query: Result<Query<FilingsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(bad_query)?;

    let key = query.parcel()?;
    let request = query.lookup_request(state.default_limit, state.max_limit)?;
    let debug = query.debug();

    let outcome = state
        .filings
        .direct_master(&key, &request)
        .await
        .map_err(|e| lookup_error(e, debug))?;

    let body = shape(outcome.records, outcome.trace, debug);
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(body)).into_response())
}

/// DOB permit issuance; query parameters are forwarded as-is
pub async fn get_dob_permits<S: DatasetSource>(
    State(state): State<AppState<S>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    match state.source.fetch_json(Dataset::Permits, &params).await {
        Ok(body) => Ok(Json(body).into_response()),
        Err(UpstreamError::Status { status, body }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            match serde_json::from_str::<Value>(&body) {
                Ok(json) => Ok((status, Json(json)).into_response()),
                Err(_) => Err(error(status, &body)),
            }
        }
        Err(e) => Err(error(StatusCode::BAD_GATEWAY, &e.to_string())),
    }
}

/// Geoclient address lookup, forwarded through
pub async fn get_geoclient_address<S: DatasetSource>(
    State(state): State<AppState<S>>,
    query: Result<Query<AddressQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(bad_query)?;

    let reply = state
        .geoclient
        .lookup_address(&query)
        .await
        .map_err(|e| match e {
            GeoclientError::ConfigurationMissing(_) => {
                error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
            }
            GeoclientError::NetworkError(_) => error(StatusCode::BAD_GATEWAY, &e.to_string()),
        })?;

    let succeeded = reply.is_success();
    match reply.body {
        GeoclientBody::Json(json) => {
            let status = if succeeded {
                StatusCode::OK
            } else {
                StatusCode::BAD_GATEWAY
            };
            Ok((status, Json(json)).into_response())
        }
        GeoclientBody::Text(text) => {
            let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
            Ok((status, text).into_response())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EchoResponse {
    pub ok: bool,
    pub route: String,
    pub now: String,
    #[serde(rename = "youSent")]
    pub you_sent: BTreeMap<String, String>,
}

/// Liveness probe that echoes its query string
pub async fn ping(Query(params): Query<BTreeMap<String, String>>) -> Json<EchoResponse> {
    Json(EchoResponse {
        ok: true,
        route: "/api/ping".to_string(),
        now: chrono::Utc::now().to_rfc3339(),
        you_sent: params,
    })
}
