use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::obfuscation::TagMatchRuleConfig;

/// Accepts a rule list either as a native sequence (config file) or as a
/// JSON encoded string (environment). Any invalid entry rejects the whole
/// list.
pub fn deserialize_tag_match_rules<'de, D>(
    deserializer: D,
) -> Result<Vec<TagMatchRuleConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: JsonValue = Deserialize::deserialize(deserializer)?;

    match value {
        JsonValue::Null => Ok(Vec::new()),
        JsonValue::String(s) if s.trim().is_empty() => Ok(Vec::new()),
        JsonValue::String(s) => serde_json::from_str(&s).map_err(|e| {
            serde::de::Error::custom(format!("Failed to parse tag match rules: {e}"))
        }),
        JsonValue::Array(a) => a
            .into_iter()
            .enumerate()
            .map(|(index, v)| {
                serde_json::from_value(v).map_err(|e| {
                    serde::de::Error::custom(format!(
                        "Failed to parse tag match rule #{index}: {e}"
                    ))
                })
            })
            .collect(),
        other => Err(serde::de::Error::custom(format!(
            "Expected a list of tag match rules, got {other}"
        ))),
    }
}
