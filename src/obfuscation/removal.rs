use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::trace;

use crate::obfuscation::handle::RuleSetHandle;
use crate::pipeline::{Datapoint, Sink, SinkError, Span, StatKeeper};

/// Strips the tags selected by its rule set from every span, then hands the
/// spans to the next sink. Datapoints pass through untouched.
pub struct SpanTagRemoval {
    rules: RuleSetHandle,
    next: Arc<dyn Sink>,
    spans: AtomicU64,
    tags_removed: AtomicU64,
}

impl SpanTagRemoval {
    #[must_use]
    pub fn new(rules: RuleSetHandle, next: Arc<dyn Sink>) -> Self {
        Self {
            rules,
            next,
            spans: AtomicU64::new(0),
            tags_removed: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSetHandle {
        &self.rules
    }
}

#[async_trait]
impl Sink for SpanTagRemoval {
    async fn add_datapoints(&self, points: Vec<Datapoint>) -> Result<(), SinkError> {
        self.next.add_datapoints(points).await
    }

    async fn add_spans(&self, mut spans: Vec<Span>) -> Result<(), SinkError> {
        let rules = self.rules.load();
        self.spans.fetch_add(spans.len() as u64, Ordering::Relaxed);

        if !rules.is_empty() {
            let mut removed = 0usize;
            for span in &mut spans {
                let selected = rules.matching_tags(span.service_name(), span.operation_name());
                for tag in selected {
                    if span.tags.remove(tag).is_some() {
                        removed += 1;
                    }
                }
            }
            if removed > 0 {
                trace!("OBFUSCATION | Removed {removed} tags from {} spans", spans.len());
                self.tags_removed
                    .fetch_add(removed as u64, Ordering::Relaxed);
            }
        }

        self.next.add_spans(spans).await
    }
}

impl StatKeeper for SpanTagRemoval {
    fn stats(&self) -> Vec<Datapoint> {
        vec![
            Datapoint::cumulative_counter(
                "metricproxy.span_tag_removal.spans",
                "span_tag_removal",
                self.spans.load(Ordering::Relaxed),
            ),
            Datapoint::cumulative_counter(
                "metricproxy.span_tag_removal.tags_removed",
                "span_tag_removal",
                self.tags_removed.load(Ordering::Relaxed),
            ),
        ]
    }
}
