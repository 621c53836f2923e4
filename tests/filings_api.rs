//! End-to-end tests for the HTTP surface.
//!
//! The router runs in-process; Socrata and Geoclient are replaced by a small
//! axum app on a loopback port so the real reqwest clients are exercised.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use parcel_filings::api::routes::create_router;
use parcel_filings::build_state;
use parcel_filings::config::AppConfig;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower::util::ServiceExt;

const LEGALS: &str = "/resource/8h5j-fqxa.json";
const MASTER: &str = "/resource/bnx9-e6tj.json";
const PERMITS: &str = "/resource/ipu4-2q9a.json";

/// Every request the fake open-data service received: (path, params)
#[derive(Default)]
struct Recorded {
    calls: Mutex<Vec<(String, HashMap<String, String>)>>,
}

impl Recorded {
    fn push(&self, path: &str, params: &HashMap<String, String>) {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), params.clone()));
    }

    fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn wheres(&self, path: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .filter_map(|(_, params)| params.get("$where").cloned())
            .collect()
    }
}

type Mock = Arc<Recorded>;

fn failing_parcel(filter: &str) -> bool {
    filter.contains("borough=5") || filter.contains("borough='5'")
}

fn upstream_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"code": "internal", "message": "try again later"})),
    )
        .into_response()
}

async fn legals(State(mock): State<Mock>, Query(params): Query<HashMap<String, String>>) -> Response {
    mock.push(LEGALS, &params);
    let filter = params.get("$where").cloned().unwrap_or_default();

    if failing_parcel(&filter) {
        return upstream_failure();
    }
    // The fake dataset stores bbl columns as numbers, so only numeric filters match
    if filter == "borough=1 AND block=1336 AND lot=66" {
        return Json(json!([
            {"document_id": "2005030100001001"},
            {"document_id": "2019052200123001"},
            {"document_id": "2005030100001001"},
            {"document_id": "2012081400456002"},
            {"document_id": ""},
        ]))
        .into_response();
    }
    Json(json!([])).into_response()
}

fn master_rows() -> Vec<Value> {
    vec![
        json!({"document_id": "2005030100001001", "doc_type": "DEED", "recorded_datetime": "2005-03-01T00:00:00.000", "document_amt": "850000"}),
        json!({"document_id": "2019052200123001", "doc_type": "MTGE", "recorded_datetime": "2019-05-22T00:00:00.000", "document_amt": "1200000"}),
        json!({"document_id": "2012081400456002", "doc_type": "DEED", "recorded_datetime": "2012-08-14T00:00:00.000", "document_amt": "1100000"}),
        json!({"document_id": "2099010100000001", "doc_type": "DEED", "recorded_datetime": "2021-01-01T00:00:00.000", "document_amt": "1"}),
    ]
}

async fn master(State(mock): State<Mock>, Query(params): Query<HashMap<String, String>>) -> Response {
    mock.push(MASTER, &params);
    let filter = params.get("$where").cloned().unwrap_or_default();

    if failing_parcel(&filter) {
        return upstream_failure();
    }
    if filter.starts_with("document_id in") {
        let rows: Vec<Value> = master_rows()
            .into_iter()
            .filter(|row| {
                let id = row["document_id"].as_str().unwrap_or_default();
                filter.contains(&format!("'{}'", id))
            })
            .collect();
        return Json(rows).into_response();
    }
    if filter == "borough=1 AND block=1336 AND lot=66" {
        return Json(master_rows()[..3].to_vec()).into_response();
    }
    Json(json!([])).into_response()
}

async fn permits(State(mock): State<Mock>, Query(params): Query<HashMap<String, String>>) -> Response {
    mock.push(PERMITS, &params);
    if params.contains_key("broken") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": true, "message": "No such column: broken"})),
        )
            .into_response();
    }
    Json(json!([{"job__": "121234567", "bin__": params.get("bin__")}, "withdrawn"])).into_response()
}

async fn geoclient(Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("key").map(String::as_str) != Some("test-key") {
        return (StatusCode::FORBIDDEN, Json(json!({"message": "invalid key"}))).into_response();
    }
    Json(json!({
        "address": {
            "houseNumber": params.get("houseNumber"),
            "bbl": "1013360066",
            "buildingIdentificationNumber": "1034567"
        }
    }))
    .into_response()
}

async fn spawn_upstream() -> (String, Mock) {
    let mock: Mock = Arc::new(Recorded::default());
    let app = Router::new()
        .route(LEGALS, get(legals))
        .route(MASTER, get(master))
        .route(PERMITS, get(permits))
        .route("/geoclient/v2/address.json", get(geoclient))
        .with_state(mock.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), mock)
}

fn test_config(upstream: &str, geoclient_key: Option<&str>) -> AppConfig {
    let mut config = AppConfig::default();
    config.socrata.base_url = upstream.to_string();
    config.geoclient.url = format!("{}/geoclient/v2", upstream);
    config.geoclient.key = geoclient_key.map(str::to_string);
    config
}

async fn setup_with_key(geoclient_key: Option<&str>) -> (Router, Mock) {
    let (upstream, mock) = spawn_upstream().await;
    let state = build_state(&test_config(&upstream, geoclient_key)).unwrap();
    (create_router().with_state(state), mock)
}

async fn setup() -> (Router, Mock) {
    setup_with_key(Some("test-key")).await
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn recorded_dates(rows: &Value) -> Vec<String> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|r| r["recorded_datetime"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn assert_non_increasing(dates: &[String]) {
    for pair in dates.windows(2) {
        assert!(pair[0] >= pair[1], "dates out of order: {:?}", dates);
    }
}

#[tokio::test]
async fn test_ping_skips_upstream() {
    let (app, mock) = setup().await;
    let (status, body) = get_json(app, "/parcel-filings?ping=1&bbl=1013360066").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true, "handler": "parcel-filings"}));
    assert_eq!(mock.count(), 0);
}

#[tokio::test]
async fn test_bbl_lookup_returns_sorted_deduplicated_filings() {
    let (app, mock) = setup().await;
    let (status, body) = get_json(app, "/parcel-filings?bbl=1013360066").await;

    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["document_id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec!["2019052200123001", "2012081400456002", "2005030100001001"]
    );
    assert_non_increasing(&recorded_dates(&body));

    // One legals hit, one master batch holding each id once
    assert_eq!(mock.wheres(LEGALS), vec!["borough=1 AND block=1336 AND lot=66"]);
    assert_eq!(
        mock.wheres(MASTER),
        vec!["document_id in ('2005030100001001','2019052200123001','2012081400456002')"]
    );
}

#[tokio::test]
async fn test_fields_with_limit() {
    let (app, _) = setup().await;
    let (status, body) = get_json(app, "/parcel-filings?borough=1&block=1336&lot=66&$limit=2").await;

    assert_eq!(status, StatusCode::OK);
    let dates = recorded_dates(&body);
    assert_eq!(dates.len(), 2);
    assert_non_increasing(&dates);
    assert_eq!(dates[0], "2019-05-22T00:00:00.000");
}

#[tokio::test]
async fn test_legacy_route_and_padded_fields() {
    let (app, _) = setup().await;
    let (status, body) = get_json(app, "/api/acris?borough=1&block=01336&lot=0066&$limit=5").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_parcel_without_filings_is_empty_success() {
    let (app, _) = setup().await;
    let (status, body) = get_json(app.clone(), "/parcel-filings?bbl=1000010001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = get_json(app, "/parcel-filings?bbl=1000010001&debug=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], json!([]));
    // Four legals variants, then four direct master variants
    assert_eq!(body["debug"].as_array().unwrap().len(), 8);
    assert_eq!(body["debug"][0]["step"], "legals:numeric");
}

#[tokio::test]
async fn test_malformed_bbl_is_bad_request() {
    let (app, mock) = setup().await;
    let (status, body) = get_json(app, "/parcel-filings?bbl=abc").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
    assert!(body["message"].as_str().unwrap().contains("BBL"));
    assert_eq!(mock.count(), 0);
}

#[tokio::test]
async fn test_invalid_limit_is_bad_request() {
    let (app, _) = setup().await;
    let (status, body) = get_json(app, "/parcel-filings?bbl=1013360066&$limit=lots").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let (app, _) = setup().await;
    let (status, body) = get_json(app, "/parcel-filings?bbl=5000050005&debug=true").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], true);
    assert_eq!(body["status"], 500);
    assert_eq!(body["debug"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn test_direct_master_route() {
    let (app, mock) = setup().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/acris/master?b=1&bl=1336&lt=66")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-store"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert!(mock.wheres(LEGALS).is_empty());
}

#[tokio::test]
async fn test_dob_permits_pass_through() {
    let (app, mock) = setup().await;
    let (status, body) = get_json(app.clone(), "/api/dob/permits?bin__=1034567&$limit=3").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["bin__"], "1034567");
    assert_eq!(body[1], "withdrawn");
    let calls = mock.calls.lock().unwrap().clone();
    assert_eq!(calls[0].1.get("$limit").map(String::as_str), Some("3"));

    let (status, body) = get_json(app, "/api/dob/permits?broken=1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No such column: broken");
}

#[tokio::test]
async fn test_geoclient_forwards_address() {
    let (app, _) = setup().await;
    let (status, body) = get_json(
        app,
        "/api/geoclient/address?houseNumber=314&street=West%20100%20Street&borough=Manhattan",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"]["bbl"], "1013360066");
    assert_eq!(body["address"]["houseNumber"], "314");
}

#[tokio::test]
async fn test_geoclient_rejected_key_is_bad_gateway() {
    let (app, _) = setup_with_key(Some("wrong-key")).await;
    let (status, body) = get_json(app, "/api/geoclient/address?houseNumber=1&street=Broadway").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["message"], "invalid key");
}

#[tokio::test]
async fn test_geoclient_without_key_is_configuration_error() {
    let (app, _) = setup_with_key(None).await;
    let (status, body) = get_json(app, "/api/geoclient/address?houseNumber=1&street=Broadway").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], true);
}

#[tokio::test]
async fn test_health_and_echo() {
    let (app, _) = setup().await;
    let (status, body) = get_json(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = get_json(app, "/api/ping?hello=world").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["youSent"]["hello"], "world");
}
