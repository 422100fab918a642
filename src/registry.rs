//! Loader registry.
//!
//! Listener and forwarder types are looked up by the `type` key of their
//! configuration. The registry is an ordinary value built at startup and
//! passed to the bootstrap, so tests can register their own loaders.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ForwarderConfig, ListenerConfig};
use crate::forwarder::{Forwarder, http::HttpForwarderLoader, log::LogForwarderLoader};
use crate::listener::{Listener, http::HttpListenerLoader};
use crate::pipeline::Sink;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unknown {kind} type: {type_name}")]
    UnknownType {
        kind: &'static str,
        type_name: String,
    },
    #[error("{type_name} requires the `{option}` option")]
    MissingOption {
        type_name: String,
        option: &'static str,
    },
    #[error("invalid `{option}` for {type_name}: {reason}")]
    InvalidOption {
        type_name: String,
        option: &'static str,
        reason: String,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("at least one forwarder must be configured")]
    NoForwarders,
}

#[async_trait]
pub trait ListenerLoader: Send + Sync {
    async fn load(
        &self,
        config: &ListenerConfig,
        sink: Arc<dyn Sink>,
    ) -> Result<Arc<dyn Listener>, LoadError>;
}

pub trait ForwarderLoader: Send + Sync {
    fn load(&self, config: &ForwarderConfig) -> Result<Arc<dyn Forwarder>, LoadError>;
}

#[derive(Clone)]
pub struct Registry {
    listeners: HashMap<String, Arc<dyn ListenerLoader>>,
    forwarders: HashMap<String, Arc<dyn ForwarderLoader>>,
}

impl Registry {
    /// A registry without any loaders.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            listeners: HashMap::new(),
            forwarders: HashMap::new(),
        }
    }

    pub fn register_listener(&mut self, type_name: &str, loader: Arc<dyn ListenerLoader>) {
        self.listeners.insert(type_name.to_string(), loader);
    }

    pub fn register_forwarder(&mut self, type_name: &str, loader: Arc<dyn ForwarderLoader>) {
        self.forwarders.insert(type_name.to_string(), loader);
    }

    pub async fn load_listener(
        &self,
        config: &ListenerConfig,
        sink: Arc<dyn Sink>,
    ) -> Result<Arc<dyn Listener>, LoadError> {
        let loader = self
            .listeners
            .get(&config.kind)
            .ok_or_else(|| LoadError::UnknownType {
                kind: "listener",
                type_name: config.kind.clone(),
            })?;
        loader.load(config, sink).await
    }

    pub fn load_forwarder(&self, config: &ForwarderConfig) -> Result<Arc<dyn Forwarder>, LoadError> {
        let loader = self
            .forwarders
            .get(&config.kind)
            .ok_or_else(|| LoadError::UnknownType {
                kind: "forwarder",
                type_name: config.kind.clone(),
            })?;
        loader.load(config)
    }
}

impl Default for Registry {
    /// Registry with the built-in `http` listener and the `http` and `log` forwarders.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_listener("http", Arc::new(HttpListenerLoader));
        registry.register_forwarder("http", Arc::new(HttpForwarderLoader));
        registry.register_forwarder("log", Arc::new(LogForwarderLoader));
        registry
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut listeners: Vec<&String> = self.listeners.keys().collect();
        let mut forwarders: Vec<&String> = self.forwarders.keys().collect();
        listeners.sort();
        forwarders.sort();
        f.debug_struct("Registry")
            .field("listeners", &listeners)
            .field("forwarders", &forwarders)
            .finish()
    }
}
