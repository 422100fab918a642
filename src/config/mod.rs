pub mod log_level;
pub mod tag_match_rules;

use std::path::Path;

use figment::providers::{Format, Yaml};
use figment::{Figment, providers::Env};
use serde::Deserialize;

use crate::config::{
    log_level::LogLevel, tag_match_rules::deserialize_tag_match_rules,
};
use crate::obfuscation::TagMatchRuleConfig;

pub const ENV_PREFIX: &str = "METRICPROXY_";
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:18080";
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 10;

/// One entry of `listen_from`.
#[derive(Debug, PartialEq, Eq, Deserialize, Clone)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct ListenerConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub listen_addr: String,
    pub max_request_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            kind: String::default(),
            name: None,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

impl ListenerConfig {
    /// Configured name, falling back to the type.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }
}

/// One entry of `forward_to`.
#[derive(Debug, PartialEq, Eq, Deserialize, Clone)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct ForwarderConfig {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        ForwarderConfig {
            kind: String::default(),
            name: None,
            url: None,
            auth_token: None,
            timeout_secs: DEFAULT_FORWARD_TIMEOUT_SECS,
        }
    }
}

impl ForwarderConfig {
    /// Configured name, falling back to the type.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub log_level: LogLevel,
    // seconds between stats drains, 0 disables the drain loop
    pub stats_delay_secs: u64,
    pub listen_from: Vec<ListenerConfig>,
    pub forward_to: Vec<ForwarderConfig>,
    #[serde(deserialize_with = "deserialize_tag_match_rules")]
    pub remove_span_tags: Vec<TagMatchRuleConfig>,
    #[serde(deserialize_with = "deserialize_tag_match_rules")]
    pub obfuscate_span_tags: Vec<TagMatchRuleConfig>,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("config file {0} not found")]
    NotFound(String),
    #[error("failed to parse config: {0}")]
    ParseError(String),
}

/// Loads the config file (YAML, which includes JSON) and applies
/// `METRICPROXY_*` environment overrides on top.
#[allow(clippy::module_name_repetitions)]
pub fn get_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    let figment = Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX));

    figment
        .extract()
        .map_err(|err| ConfigError::ParseError(err.to_string()))
}

#[cfg(test)]
pub mod tests {
    use super::*;

    const CONFIG_FILE: &str = "metricproxy.conf";

    #[test]
    fn test_missing_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            let err = get_config(Path::new(CONFIG_FILE)).expect_err("file does not exist");
            assert_eq!(err, ConfigError::NotFound(CONFIG_FILE.to_string()));
            Ok(())
        });
    }

    #[test]
    fn test_parse_default() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(CONFIG_FILE, "{}")?;
            let config = get_config(Path::new(CONFIG_FILE)).expect("should parse config");
            assert_eq!(config, Config::default());
            assert_eq!(config.log_level, LogLevel::Warn);
            assert_eq!(config.stats_delay_secs, 0);
            Ok(())
        });
    }

    #[test]
    fn test_parse_json_config_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                CONFIG_FILE,
                r#"{
                    "log_level": "debug",
                    "stats_delay_secs": 10,
                    "listen_from": [
                        {"type": "http", "listen_addr": "0.0.0.0:8080"}
                    ],
                    "forward_to": [
                        {"type": "http", "name": "ingest", "url": "https://ingest.example.com", "auth_token": "abc"},
                        {"type": "log"}
                    ],
                    "remove_span_tags": [
                        {"service": "checkout", "tags": ["user.email"]},
                        {"tags": ["password"]}
                    ]
                }"#,
            )?;
            let config = get_config(Path::new(CONFIG_FILE)).expect("should parse config");

            assert_eq!(config.log_level, LogLevel::Debug);
            assert_eq!(config.stats_delay_secs, 10);
            assert_eq!(
                config.listen_from,
                vec![ListenerConfig {
                    kind: "http".to_string(),
                    listen_addr: "0.0.0.0:8080".to_string(),
                    ..ListenerConfig::default()
                }]
            );
            assert_eq!(config.forward_to.len(), 2);
            assert_eq!(config.forward_to[0].name(), "ingest");
            assert_eq!(config.forward_to[0].auth_token.as_deref(), Some("abc"));
            assert_eq!(config.forward_to[1].name(), "log");
            assert_eq!(
                config.forward_to[1].timeout_secs,
                DEFAULT_FORWARD_TIMEOUT_SECS
            );
            assert_eq!(
                config.remove_span_tags,
                vec![
                    TagMatchRuleConfig {
                        service: Some("checkout".to_string()),
                        operation: None,
                        tags: vec!["user.email".to_string()],
                    },
                    TagMatchRuleConfig {
                        service: None,
                        operation: None,
                        tags: vec!["password".to_string()],
                    },
                ]
            );
            assert!(config.obfuscate_span_tags.is_empty());
            Ok(())
        });
    }

    #[test]
    fn test_parse_yaml_config_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                CONFIG_FILE,
                r"
                forward_to:
                  - type: log
                obfuscate_span_tags:
                  - service: 'auth-*'
                    operation: login
                    tags:
                      - user.name
            ",
            )?;
            let config = get_config(Path::new(CONFIG_FILE)).expect("should parse config");
            assert_eq!(
                config.obfuscate_span_tags,
                vec![TagMatchRuleConfig {
                    service: Some("auth-*".to_string()),
                    operation: Some("login".to_string()),
                    tags: vec!["user.name".to_string()],
                }]
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(CONFIG_FILE, r#"{"log_level": "error", "stats_delay_secs": 5}"#)?;
            jail.set_env("METRICPROXY_LOG_LEVEL", "TRACE");
            jail.set_env("METRICPROXY_STATS_DELAY_SECS", "30");
            let config = get_config(Path::new(CONFIG_FILE)).expect("should parse config");
            assert_eq!(config.log_level, LogLevel::Trace);
            assert_eq!(config.stats_delay_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn test_parse_tag_match_rules_from_env() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                CONFIG_FILE,
                r#"{"remove_span_tags": [{"tags": ["from-file"]}]}"#,
            )?;
            jail.set_env(
                "METRICPROXY_REMOVE_SPAN_TAGS",
                r#"[{"service":"checkout","tags":["password"]}]"#,
            );
            let config = get_config(Path::new(CONFIG_FILE)).expect("should parse config");
            assert_eq!(
                config.remove_span_tags,
                vec![TagMatchRuleConfig {
                    service: Some("checkout".to_string()),
                    operation: None,
                    tags: vec!["password".to_string()],
                }]
            );
            Ok(())
        });
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                CONFIG_FILE,
                r#"{"remove_span_tags": [{"service": "checkout"}]}"#,
            )?;
            let err = get_config(Path::new(CONFIG_FILE)).expect_err("rule without tags");
            assert!(matches!(err, ConfigError::ParseError(_)));
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(CONFIG_FILE, r#"{"forward_to": 12"#)?;
            let err = get_config(Path::new(CONFIG_FILE)).expect_err("malformed file");
            assert!(matches!(err, ConfigError::ParseError(_)));
            Ok(())
        });
    }
}
