use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use core::time::Duration;
use serde_json::json;
use tracing::{debug, error};

/// HTTP client shared by the requests of one forwarder.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        // Enable TCP keepalive
        .tcp_keepalive(Some(Duration::from_secs(120)))
        .build()
}

pub async fn handler_not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

/// Logs `message` (error level unless `status` is a success) and returns it
/// as a JSON body: `{"message": message}`.
#[must_use]
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> Response {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    (status, json!({ "message": message }).to_string()).into_response()
}
