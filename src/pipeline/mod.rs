//! Data model and the traits every pipeline stage implements.
//!
//! Listeners push into a [`Sink`]; obfuscation stages are sinks that wrap the
//! next sink; the multiplexer is the last sink and fans out to forwarders.

pub mod datapoint;
pub mod span;

use async_trait::async_trait;

pub use datapoint::{Datapoint, MetricType};
pub use span::{Endpoint, Span};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("{0} is closed")]
    Closed(String),
    #[error("{failed} of {total} forwarders failed, first error: {first}")]
    FanOut {
        failed: usize,
        total: usize,
        first: Box<SinkError>,
    },
}

#[async_trait]
pub trait Sink: Send + Sync {
    async fn add_datapoints(&self, points: Vec<Datapoint>) -> Result<(), SinkError>;

    async fn add_spans(&self, spans: Vec<Span>) -> Result<(), SinkError>;
}

/// A component that reports its internal counters as datapoints.
pub trait StatKeeper: Send + Sync {
    fn stats(&self) -> Vec<Datapoint>;
}
