use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    #[default]
    Gauge,
    Counter,
    CumulativeCounter,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    pub metric: String,
    pub value: f64,
    #[serde(default)]
    pub metric_type: MetricType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimensions: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
}

impl Datapoint {
    /// Internal counter reported by a pipeline component, tagged with the
    /// component's configured name.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cumulative_counter(metric: &str, component: &str, value: u64) -> Self {
        Self {
            metric: metric.to_string(),
            value: value as f64,
            metric_type: MetricType::CumulativeCounter,
            dimensions: BTreeMap::from([("name".to_string(), component.to_string())]),
            timestamp_ms: None,
        }
    }
}
