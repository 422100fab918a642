use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::ListenerConfig;
use crate::forwarder::http::{DATAPOINT_PATH, TRACE_PATH};
use crate::http::{handler_not_found, log_and_create_http_response};
use crate::listener::Listener;
use crate::pipeline::{Datapoint, Sink, Span, StatKeeper};
use crate::registry::{ListenerLoader, LoadError};

pub const HEALTH_PATH: &str = "/healthz";

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    datapoints: AtomicU64,
    spans: AtomicU64,
    bad_requests: AtomicU64,
    sink_errors: AtomicU64,
}

type ListenerState = (Arc<dyn Sink>, Arc<Counters>);

/// Accepts JSON datapoints and spans over HTTP.
pub struct HttpListener {
    name: String,
    local_addr: SocketAddr,
    counters: Arc<Counters>,
    shutdown_token: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
}

impl HttpListener {
    /// Binds `config.listen_addr` and starts serving in the background.
    pub async fn bind(config: &ListenerConfig, sink: Arc<dyn Sink>) -> Result<Self, LoadError> {
        let listener = TcpListener::bind(&config.listen_addr)
            .await
            .map_err(|source| LoadError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| LoadError::Bind {
            addr: config.listen_addr.clone(),
            source,
        })?;

        let name = config.name().to_string();
        let counters = Arc::new(Counters::default());
        let router = Self::make_router(sink, Arc::clone(&counters), config.max_request_bytes);

        let shutdown_token = CancellationToken::new();
        let shutdown = shutdown_token.clone();
        let server_name = name.clone();
        let server = tokio::spawn(async move {
            debug!("LISTENER | {server_name} listening on {local_addr}");
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!("LISTENER | {server_name} stopped with error: {e}");
            }
        });

        Ok(Self {
            name,
            local_addr,
            counters,
            shutdown_token,
            server: Mutex::new(Some(server)),
        })
    }

    fn make_router(sink: Arc<dyn Sink>, counters: Arc<Counters>, max_request_bytes: usize) -> Router {
        let state: ListenerState = (sink, counters);

        Router::new()
            .route(DATAPOINT_PATH, post(Self::datapoints))
            .route(TRACE_PATH, post(Self::traces))
            .route(HEALTH_PATH, get(Self::health))
            .fallback(handler_not_found)
            .layer(DefaultBodyLimit::max(max_request_bytes))
            .with_state(state)
    }

    async fn health() -> Response {
        log_and_create_http_response("OK", StatusCode::OK)
    }

    async fn datapoints(State((sink, counters)): State<ListenerState>, body: Bytes) -> Response {
        counters.requests.fetch_add(1, Ordering::Relaxed);
        let points: Vec<Datapoint> = match decode(&body, &counters) {
            Ok(points) => points,
            Err(response) => return response,
        };
        counters
            .datapoints
            .fetch_add(points.len() as u64, Ordering::Relaxed);

        match sink.add_datapoints(points).await {
            Ok(()) => log_and_create_http_response("OK", StatusCode::OK),
            Err(e) => {
                counters.sink_errors.fetch_add(1, Ordering::Relaxed);
                log_and_create_http_response(
                    &format!("LISTENER | Failed to forward datapoints: {e}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    }

    async fn traces(State((sink, counters)): State<ListenerState>, body: Bytes) -> Response {
        counters.requests.fetch_add(1, Ordering::Relaxed);
        let spans: Vec<Span> = match decode(&body, &counters) {
            Ok(spans) => spans,
            Err(response) => return response,
        };
        counters
            .spans
            .fetch_add(spans.len() as u64, Ordering::Relaxed);

        match sink.add_spans(spans).await {
            Ok(()) => log_and_create_http_response("OK", StatusCode::OK),
            Err(e) => {
                counters.sink_errors.fetch_add(1, Ordering::Relaxed);
                log_and_create_http_response(
                    &format!("LISTENER | Failed to forward spans: {e}"),
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8], counters: &Counters) -> Result<Vec<T>, Response> {
    serde_json::from_slice(body).map_err(|e| {
        counters.bad_requests.fetch_add(1, Ordering::Relaxed);
        log_and_create_http_response(
            &format!("LISTENER | Unable to parse request body: {e}"),
            StatusCode::BAD_REQUEST,
        )
    })
}

impl StatKeeper for HttpListener {
    fn stats(&self) -> Vec<Datapoint> {
        let counter = |metric: &str, value: &AtomicU64| {
            Datapoint::cumulative_counter(metric, &self.name, value.load(Ordering::Relaxed))
        };
        vec![
            counter("metricproxy.listener.requests", &self.counters.requests),
            counter("metricproxy.listener.datapoints", &self.counters.datapoints),
            counter("metricproxy.listener.spans", &self.counters.spans),
            counter("metricproxy.listener.bad_requests", &self.counters.bad_requests),
            counter("metricproxy.listener.sink_errors", &self.counters.sink_errors),
        ]
    }
}

#[async_trait]
impl Listener for HttpListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    async fn close(&self) {
        self.shutdown_token.cancel();
        if let Some(server) = self.server.lock().await.take() {
            if let Err(e) = server.await {
                error!("LISTENER | {} server task failed: {e}", self.name);
            }
            debug!("LISTENER | {} closed", self.name);
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HttpListenerLoader;

#[async_trait]
impl ListenerLoader for HttpListenerLoader {
    async fn load(
        &self,
        config: &ListenerConfig,
        sink: Arc<dyn Sink>,
    ) -> Result<Arc<dyn Listener>, LoadError> {
        Ok(Arc::new(HttpListener::bind(config, sink).await?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::obfuscation::removal::tests::{CapturingSink, span};
    use crate::pipeline::SinkError;

    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        async fn add_datapoints(&self, _points: Vec<Datapoint>) -> Result<(), SinkError> {
            Err(SinkError::Closed("test".to_string()))
        }

        async fn add_spans(&self, _spans: Vec<Span>) -> Result<(), SinkError> {
            Err(SinkError::Closed("test".to_string()))
        }
    }

    fn config(max_request_bytes: usize) -> ListenerConfig {
        ListenerConfig {
            kind: "http".to_string(),
            name: Some("ingress".to_string()),
            listen_addr: "127.0.0.1:0".to_string(),
            max_request_bytes,
        }
    }

    fn url(listener: &HttpListener, path: &str) -> String {
        format!("http://{}{path}", listener.local_addr)
    }

    #[tokio::test]
    async fn test_accepts_spans_and_datapoints() {
        let sink = Arc::new(CapturingSink::default());
        let listener = HttpListener::bind(&config(1024 * 1024), sink.clone())
            .await
            .unwrap();
        let client = reqwest::Client::new();

        let spans = vec![span("checkout", "charge", &[("amount", "5")])];
        let response = client
            .post(url(&listener, TRACE_PATH))
            .json(&spans)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let points = vec![Datapoint::cumulative_counter("requests", "api", 1)];
        let response = client
            .post(url(&listener, DATAPOINT_PATH))
            .json(&points)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        assert_eq!(*sink.spans.lock().await, spans);
        assert_eq!(*sink.points.lock().await, points);

        let stats = listener.stats();
        assert!((stats[0].value - 2.0).abs() < f64::EPSILON);
        assert!((stats[1].value - 1.0).abs() < f64::EPSILON);
        assert!((stats[2].value - 1.0).abs() < f64::EPSILON);
        listener.close().await;
    }

    #[tokio::test]
    async fn test_health_and_not_found() {
        let listener = HttpListener::bind(&config(1024), Arc::new(CapturingSink::default()))
            .await
            .unwrap();
        let client = reqwest::Client::new();

        let health = client.get(url(&listener, HEALTH_PATH)).send().await.unwrap();
        assert_eq!(health.status(), 200);

        let missing = client.get(url(&listener, "/v9/nothing")).send().await.unwrap();
        assert_eq!(missing.status(), 404);
        listener.close().await;
    }

    #[tokio::test]
    async fn test_rejects_bad_json() {
        let sink = Arc::new(CapturingSink::default());
        let listener = HttpListener::bind(&config(1024), sink.clone()).await.unwrap();

        let response = reqwest::Client::new()
            .post(url(&listener, TRACE_PATH))
            .body("not json")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
        assert!(sink.spans.lock().await.is_empty());
        assert!((listener.stats()[3].value - 1.0).abs() < f64::EPSILON);
        listener.close().await;
    }

    #[tokio::test]
    async fn test_rejects_oversized_body() {
        let listener = HttpListener::bind(&config(16), Arc::new(CapturingSink::default()))
            .await
            .unwrap();

        let response = reqwest::Client::new()
            .post(url(&listener, DATAPOINT_PATH))
            .body(vec![b' '; 1024])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 413);
        listener.close().await;
    }

    #[tokio::test]
    async fn test_sink_failure_is_500() {
        let listener = HttpListener::bind(&config(1024), Arc::new(FailingSink))
            .await
            .unwrap();

        let response = reqwest::Client::new()
            .post(url(&listener, DATAPOINT_PATH))
            .body("[]")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        assert!((listener.stats()[4].value - 1.0).abs() < f64::EPSILON);
        listener.close().await;
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = HttpListener::bind(&config(1024), Arc::new(CapturingSink::default()))
            .await
            .unwrap();
        let taken = ListenerConfig {
            listen_addr: first.local_addr.to_string(),
            ..config(1024)
        };

        let err = HttpListener::bind(&taken, Arc::new(CapturingSink::default()))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, LoadError::Bind { .. }));
        first.close().await;
    }

    #[tokio::test]
    async fn test_close_stops_serving() {
        let listener = HttpListener::bind(&config(1024), Arc::new(CapturingSink::default()))
            .await
            .unwrap();
        let health = url(&listener, HEALTH_PATH);

        listener.close().await;
        listener.close().await;

        assert!(reqwest::Client::new().get(health).send().await.is_err());
    }
}
