//! Fan-out of every batch to all configured forwarders.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;

use crate::forwarder::Forwarder;
use crate::pipeline::{Datapoint, Sink, SinkError, Span, StatKeeper};
use crate::registry::LoadError;

const NAME: &str = "multiplexer";

/// Sends each batch to every forwarder concurrently. A batch is attempted on
/// all forwarders even when some of them fail; the first failure is reported.
pub struct Multiplexer {
    forwarders: Vec<Arc<dyn Forwarder>>,
    datapoints: AtomicU64,
    spans: AtomicU64,
    failed_sends: AtomicU64,
}

impl Multiplexer {
    pub fn new(forwarders: Vec<Arc<dyn Forwarder>>) -> Result<Self, LoadError> {
        if forwarders.is_empty() {
            return Err(LoadError::NoForwarders);
        }
        Ok(Self {
            forwarders,
            datapoints: AtomicU64::new(0),
            spans: AtomicU64::new(0),
            failed_sends: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn forwarders(&self) -> &[Arc<dyn Forwarder>] {
        &self.forwarders
    }

    fn collect(&self, results: Vec<Result<(), SinkError>>) -> Result<(), SinkError> {
        let total = results.len();
        let mut failed = 0;
        let mut first = None;
        for (forwarder, result) in self.forwarders.iter().zip(results) {
            if let Err(e) = result {
                warn!("MULTIPLEXER | Forwarder {} failed: {e}", forwarder.name());
                failed += 1;
                first.get_or_insert(e);
            }
        }

        match first {
            None => Ok(()),
            Some(first) => {
                self.failed_sends
                    .fetch_add(failed as u64, Ordering::Relaxed);
                Err(SinkError::FanOut {
                    failed,
                    total,
                    first: Box::new(first),
                })
            }
        }
    }
}

#[async_trait]
impl Sink for Multiplexer {
    async fn add_datapoints(&self, points: Vec<Datapoint>) -> Result<(), SinkError> {
        self.datapoints
            .fetch_add(points.len() as u64, Ordering::Relaxed);
        let sends = self
            .forwarders
            .iter()
            .map(|forwarder| forwarder.add_datapoints(points.clone()));
        let results = join_all(sends).await;
        self.collect(results)
    }

    async fn add_spans(&self, spans: Vec<Span>) -> Result<(), SinkError> {
        self.spans.fetch_add(spans.len() as u64, Ordering::Relaxed);
        let sends = self
            .forwarders
            .iter()
            .map(|forwarder| forwarder.add_spans(spans.clone()));
        let results = join_all(sends).await;
        self.collect(results)
    }
}

impl StatKeeper for Multiplexer {
    fn stats(&self) -> Vec<Datapoint> {
        vec![
            Datapoint::cumulative_counter(
                "metricproxy.multiplexer.datapoints",
                NAME,
                self.datapoints.load(Ordering::Relaxed),
            ),
            Datapoint::cumulative_counter(
                "metricproxy.multiplexer.spans",
                NAME,
                self.spans.load(Ordering::Relaxed),
            ),
            Datapoint::cumulative_counter(
                "metricproxy.multiplexer.failed_sends",
                NAME,
                self.failed_sends.load(Ordering::Relaxed),
            ),
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use tokio::sync::Mutex;

    use super::*;
    use crate::obfuscation::removal::tests::span;

    /// Forwarder that records what it gets, or fails every call.
    #[derive(Default)]
    pub(crate) struct RecordingForwarder {
        pub(crate) name: String,
        pub(crate) fail: bool,
        pub(crate) points: Mutex<Vec<Datapoint>>,
        pub(crate) spans: Mutex<Vec<Span>>,
    }

    impl RecordingForwarder {
        pub(crate) fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl Sink for RecordingForwarder {
        async fn add_datapoints(&self, points: Vec<Datapoint>) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Closed(self.name.clone()));
            }
            self.points.lock().await.extend(points);
            Ok(())
        }

        async fn add_spans(&self, spans: Vec<Span>) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Closed(self.name.clone()));
            }
            self.spans.lock().await.extend(spans);
            Ok(())
        }
    }

    impl StatKeeper for RecordingForwarder {
        fn stats(&self) -> Vec<Datapoint> {
            vec![Datapoint::cumulative_counter("test.forwarder", &self.name, 1)]
        }
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        fn name(&self) -> &str {
            &self.name
        }
    }

    #[test]
    fn test_requires_a_forwarder() {
        assert!(matches!(
            Multiplexer::new(Vec::new()),
            Err(LoadError::NoForwarders)
        ));
    }

    #[tokio::test]
    async fn test_every_forwarder_gets_every_batch() {
        let first = RecordingForwarder::new("first", false);
        let second = RecordingForwarder::new("second", false);
        let multiplexer = Multiplexer::new(vec![first.clone(), second.clone()]).unwrap();

        let spans = vec![span("checkout", "charge", &[("amount", "5")])];
        multiplexer.add_spans(spans.clone()).await.unwrap();
        let points = vec![Datapoint::cumulative_counter("requests", "api", 2)];
        multiplexer.add_datapoints(points.clone()).await.unwrap();

        for forwarder in [&first, &second] {
            assert_eq!(*forwarder.spans.lock().await, spans);
            assert_eq!(*forwarder.points.lock().await, points);
        }
        assert_eq!(multiplexer.forwarders().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_forwarders() {
        let broken = RecordingForwarder::new("broken", true);
        let healthy = RecordingForwarder::new("healthy", false);
        let multiplexer = Multiplexer::new(vec![broken, healthy.clone()]).unwrap();

        let err = multiplexer
            .add_spans(vec![span("cart", "add", &[])])
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "1 of 2 forwarders failed, first error: broken is closed"
        );
        assert_eq!(healthy.spans.lock().await.len(), 1);
        assert!((multiplexer.stats()[2].value - 1.0).abs() < f64::EPSILON);
    }
}
