use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::ForwarderConfig;
use crate::forwarder::Forwarder;
use crate::http::build_client;
use crate::pipeline::{Datapoint, Sink, SinkError, Span, StatKeeper};
use crate::registry::{ForwarderLoader, LoadError};

pub const AUTH_TOKEN_HEADER: &str = "X-SF-Token";
pub const DATAPOINT_PATH: &str = "/v2/datapoint";
pub const TRACE_PATH: &str = "/v1/trace";

/// Posts JSON batches to an ingest endpoint.
pub struct HttpForwarder {
    name: String,
    client: reqwest::Client,
    datapoint_url: String,
    trace_url: String,
    auth_token: Option<String>,
    datapoints: AtomicU64,
    spans: AtomicU64,
    errors: AtomicU64,
}

impl HttpForwarder {
    pub fn new(config: &ForwarderConfig) -> Result<Self, LoadError> {
        let url = config.url.as_deref().ok_or_else(|| LoadError::MissingOption {
            type_name: config.kind.clone(),
            option: "url",
        })?;
        reqwest::Url::parse(url).map_err(|e| LoadError::InvalidOption {
            type_name: config.kind.clone(),
            option: "url",
            reason: e.to_string(),
        })?;
        let base = url.trim_end_matches('/');

        Ok(Self {
            name: config.name().to_string(),
            client: build_client(Duration::from_secs(config.timeout_secs))?,
            datapoint_url: format!("{base}{DATAPOINT_PATH}"),
            trace_url: format!("{base}{TRACE_PATH}"),
            auth_token: config.auth_token.clone(),
            datapoints: AtomicU64::new(0),
            spans: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        })
    }

    async fn post<T: Serialize + Sync>(&self, url: &str, body: &T) -> Result<(), SinkError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.auth_token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }

        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(SinkError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            }),
            Err(source) => Err(SinkError::Request {
                url: url.to_string(),
                source,
            }),
        };

        if let Err(e) = &result {
            self.errors.fetch_add(1, Ordering::Relaxed);
            error!("FORWARDER | {} failed to forward: {e}", self.name);
        }
        result
    }
}

#[async_trait]
impl Sink for HttpForwarder {
    async fn add_datapoints(&self, points: Vec<Datapoint>) -> Result<(), SinkError> {
        if points.is_empty() {
            return Ok(());
        }
        self.post(&self.datapoint_url, &points).await?;
        self.datapoints
            .fetch_add(points.len() as u64, Ordering::Relaxed);
        debug!("FORWARDER | {} sent {} datapoints", self.name, points.len());
        Ok(())
    }

    async fn add_spans(&self, spans: Vec<Span>) -> Result<(), SinkError> {
        if spans.is_empty() {
            return Ok(());
        }
        self.post(&self.trace_url, &spans).await?;
        self.spans.fetch_add(spans.len() as u64, Ordering::Relaxed);
        debug!("FORWARDER | {} sent {} spans", self.name, spans.len());
        Ok(())
    }
}

impl StatKeeper for HttpForwarder {
    fn stats(&self) -> Vec<Datapoint> {
        vec![
            Datapoint::cumulative_counter(
                "metricproxy.forwarder.datapoints_sent",
                &self.name,
                self.datapoints.load(Ordering::Relaxed),
            ),
            Datapoint::cumulative_counter(
                "metricproxy.forwarder.spans_sent",
                &self.name,
                self.spans.load(Ordering::Relaxed),
            ),
            Datapoint::cumulative_counter(
                "metricproxy.forwarder.errors",
                &self.name,
                self.errors.load(Ordering::Relaxed),
            ),
        ]
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HttpForwarderLoader;

impl ForwarderLoader for HttpForwarderLoader {
    fn load(&self, config: &ForwarderConfig) -> Result<Arc<dyn Forwarder>, LoadError> {
        Ok(Arc::new(HttpForwarder::new(config)?))
    }
}
