use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// One log line per request: method, path, status, latency
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    if status.is_server_error() {
        log::warn!("{} {} -> {} ({:?})", method, path, status.as_u16(), started.elapsed());
    } else {
        log::info!("{} {} -> {} ({:?})", method, path, status.as_u16(), started.elapsed());
    }

    response
}
