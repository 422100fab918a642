use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::debug;

use crate::config::ForwarderConfig;
use crate::forwarder::Forwarder;
use crate::pipeline::{Datapoint, Sink, SinkError, Span, StatKeeper};
use crate::registry::{ForwarderLoader, LoadError};

/// Forwarder that only logs what it receives. Handy for dry runs.
pub struct LogForwarder {
    name: String,
    datapoints: AtomicU64,
    spans: AtomicU64,
}

impl LogForwarder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            datapoints: AtomicU64::new(0),
            spans: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Sink for LogForwarder {
    async fn add_datapoints(&self, points: Vec<Datapoint>) -> Result<(), SinkError> {
        self.datapoints
            .fetch_add(points.len() as u64, Ordering::Relaxed);
        for point in &points {
            debug!(
                "FORWARDER | {} datapoint {}={} {:?}",
                self.name, point.metric, point.value, point.dimensions
            );
        }
        Ok(())
    }

    async fn add_spans(&self, spans: Vec<Span>) -> Result<(), SinkError> {
        self.spans.fetch_add(spans.len() as u64, Ordering::Relaxed);
        for span in &spans {
            debug!(
                "FORWARDER | {} span {}/{} service={} operation={} tags={:?}",
                self.name,
                span.trace_id,
                span.id,
                span.service_name(),
                span.operation_name(),
                span.tags
            );
        }
        Ok(())
    }
}

impl StatKeeper for LogForwarder {
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
        ]
    }
}

#[async_trait]
impl Forwarder for LogForwarder {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogForwarderLoader;

impl ForwarderLoader for LogForwarderLoader {
    fn load(&self, config: &ForwarderConfig) -> Result<Arc<dyn Forwarder>, LoadError> {
        Ok(Arc::new(LogForwarder::new(config.name())))
    }
}
