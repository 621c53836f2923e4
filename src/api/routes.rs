use axum::{middleware, routing::get, Router};

use crate::api::handlers::{self, AppState};
use crate::api::logging::log_requests;
use crate::upstream::DatasetSource;

pub fn create_router<S: DatasetSource + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/api/ping", get(handlers::ping))
        // Parcel filings (legals -> master chain)
        .route("/parcel-filings", get(handlers::get_parcel_filings::<S>))
        .route("/api/acris", get(handlers::get_parcel_filings::<S>))
        // Master dataset by parcel fields only
        .route("/api/acris/master", get(handlers::get_master_by_parcel::<S>))
        // Pass-through proxies
        .route("/api/dob/permits", get(handlers::get_dob_permits::<S>))
        .route(
            "/api/geoclient/address",
            get(handlers::get_geoclient_address::<S>),
        )
        .layer(middleware::from_fn(log_requests))
}
