use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::trace;

use crate::obfuscation::handle::RuleSetHandle;
use crate::pipeline::{Datapoint, Sink, SinkError, Span, StatKeeper};

/// Value written over every obfuscated tag.
pub const OBFUSCATED: &str = "<obfuscated>";

/// Like [`crate::obfuscation::removal::SpanTagRemoval`], but keeps the selected
/// tags and overwrites their values with [`OBFUSCATED`].
pub struct SpanTagObfuscation {
    rules: RuleSetHandle,
    next: Arc<dyn Sink>,
    spans: AtomicU64,
    tags_obfuscated: AtomicU64,
}

impl SpanTagObfuscation {
    #[must_use]
    pub fn new(rules: RuleSetHandle, next: Arc<dyn Sink>) -> Self {
        Self {
            rules,
            next,
            spans: AtomicU64::new(0),
            tags_obfuscated: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSetHandle {
        &self.rules
    }
}

#[async_trait]
impl Sink for SpanTagObfuscation {
    async fn add_datapoints(&self, points: Vec<Datapoint>) -> Result<(), SinkError> {
        self.next.add_datapoints(points).await
    }

    async fn add_spans(&self, mut spans: Vec<Span>) -> Result<(), SinkError> {
        let rules = self.rules.load();
        self.spans.fetch_add(spans.len() as u64, Ordering::Relaxed);

        if !rules.is_empty() {
            let mut obfuscated = 0usize;
            for span in &mut spans {
                let selected = rules.matching_tags(span.service_name(), span.operation_name());
                for tag in selected {
                    if let Some(value) = span.tags.get_mut(tag) {
                        OBFUSCATED.clone_into(value);
                        obfuscated += 1;
                    }
                }
            }
            if obfuscated > 0 {
                trace!(
                    "OBFUSCATION | Obfuscated {obfuscated} tags across {} spans",
                    spans.len()
                );
                self.tags_obfuscated
                    .fetch_add(obfuscated as u64, Ordering::Relaxed);
            }
        }

        self.next.add_spans(spans).await
    }
}

impl StatKeeper for SpanTagObfuscation {
    fn stats(&self) -> Vec<Datapoint> {
        vec![
            Datapoint::cumulative_counter(
                "metricproxy.span_tag_obfuscation.spans",
                "span_tag_obfuscation",
                self.spans.load(Ordering::Relaxed),
            ),
            Datapoint::cumulative_counter(
                "metricproxy.span_tag_obfuscation.tags_obfuscated",
                "span_tag_obfuscation",
                self.tags_obfuscated.load(Ordering::Relaxed),
            ),
        ]
    }
}
