//! Startup, reload and ordered shutdown of the proxy.
//!
//! The pipeline is wired as
//! `listener -> span tag removal -> span tag obfuscation -> multiplexer -> forwarders`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError, get_config};
use crate::forwarder::Forwarder;
use crate::listener::Listener;
use crate::multiplexer::Multiplexer;
use crate::obfuscation::{
    RuleBuildError, RuleSet, RuleSetHandle, SpanTagObfuscation, SpanTagRemoval,
};
use crate::pipeline::StatKeeper;
use crate::registry::{LoadError, Registry};
use crate::stats::StatsDrainer;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Rules(#[from] RuleBuildError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Live rule sets of both obfuscation stages.
#[derive(Clone, Debug, Default)]
pub struct ObfuscationRules {
    removal: RuleSetHandle,
    obfuscation: RuleSetHandle,
}

impl ObfuscationRules {
    pub fn build(config: &Config) -> Result<Self, RuleBuildError> {
        Ok(Self {
            removal: RuleSetHandle::build(&config.remove_span_tags)?,
            obfuscation: RuleSetHandle::build(&config.obfuscate_span_tags)?,
        })
    }

    #[must_use]
    pub fn removal(&self) -> &RuleSetHandle {
        &self.removal
    }

    #[must_use]
    pub fn obfuscation(&self) -> &RuleSetHandle {
        &self.obfuscation
    }

    /// Builds both rule sets from `config` and only then swaps them in, so a
    /// bad rule in either list leaves both stages untouched.
    pub fn reload(&self, config: &Config) -> Result<(), RuleBuildError> {
        let removal = RuleSet::build(&config.remove_span_tags)?;
        let obfuscation = RuleSet::build(&config.obfuscate_span_tags)?;
        info!(
            "BOOTSTRAP | Reloaded {} removal and {} obfuscation rules",
            removal.len(),
            obfuscation.len()
        );
        self.removal.store(removal);
        self.obfuscation.store(obfuscation);
        Ok(())
    }

    /// Re-reads the configuration file and reloads from it.
    pub fn reload_from_file(&self, path: &Path) -> Result<(), BootstrapError> {
        let config = get_config(path)?;
        self.reload(&config)?;
        Ok(())
    }
}

pub struct Proxy {
    rules: ObfuscationRules,
    forwarders: Vec<Arc<dyn Forwarder>>,
    listeners: Vec<Arc<dyn Listener>>,
    stats: Option<(CancellationToken, JoinHandle<()>)>,
}

impl Proxy {
    /// Builds and starts every component of `config`.
    ///
    /// Nothing is started when a rule or a forwarder fails to load. Listeners
    /// already bound are closed again when a later one fails.
    pub async fn start(config: &Config, registry: &Registry) -> Result<Self, BootstrapError> {
        let rules = ObfuscationRules::build(config)?;

        let forwarders = config
            .forward_to
            .iter()
            .map(|forwarder| registry.load_forwarder(forwarder))
            .collect::<Result<Vec<_>, _>>()?;
        let multiplexer = Arc::new(Multiplexer::new(forwarders.clone())?);
        let obfuscation = Arc::new(SpanTagObfuscation::new(
            rules.obfuscation.clone(),
            multiplexer.clone(),
        ));
        let removal = Arc::new(SpanTagRemoval::new(
            rules.removal.clone(),
            obfuscation.clone(),
        ));

        let mut listeners: Vec<Arc<dyn Listener>> = Vec::with_capacity(config.listen_from.len());
        for listener_config in &config.listen_from {
            match registry.load_listener(listener_config, removal.clone()).await {
                Ok(listener) => {
                    debug!("BOOTSTRAP | Started listener {}", listener.name());
                    listeners.push(listener);
                }
                Err(e) => {
                    for listener in &listeners {
                        listener.close().await;
                    }
                    return Err(e.into());
                }
            }
        }

        let stats = if config.stats_delay_secs > 0 {
            let keepers: Vec<Arc<dyn StatKeeper>> = vec![multiplexer, removal, obfuscation];
            let drainer = StatsDrainer::new(
                Duration::from_secs(config.stats_delay_secs),
                forwarders.clone(),
                listeners.clone(),
                keepers,
            );
            let token = drainer.cancel_token();
            let task = tokio::spawn(async move { drainer.spin().await });
            Some((token, task))
        } else {
            None
        };

        info!(
            "BOOTSTRAP | Proxy started with {} listeners and {} forwarders",
            listeners.len(),
            forwarders.len()
        );
        Ok(Self {
            rules,
            forwarders,
            listeners,
            stats,
        })
    }

    #[must_use]
    pub fn rules(&self) -> &ObfuscationRules {
        &self.rules
    }

    #[must_use]
    pub fn listeners(&self) -> &[Arc<dyn Listener>] {
        &self.listeners
    }

    #[must_use]
    pub fn forwarders(&self) -> &[Arc<dyn Forwarder>] {
        &self.forwarders
    }

    /// Runs until `shutdown` is cancelled, then shuts down.
    pub async fn run_until(self, shutdown: CancellationToken) {
        shutdown.cancelled().await;
        debug!("BOOTSTRAP | Shutdown signal received");
        self.shutdown().await;
    }

    /// Stops listeners first, then the stats loop, then closes forwarders.
    pub async fn shutdown(self) {
        for listener in &self.listeners {
            listener.close().await;
        }
        if let Some((token, task)) = self.stats {
            token.cancel();
            if let Err(e) = task.await {
                error!("BOOTSTRAP | Stats loop failed: {e}");
            }
        }
        for forwarder in &self.forwarders {
            forwarder.close().await;
        }
        info!("BOOTSTRAP | Proxy stopped");
    }
}

/// Writes the current process id to `path`.
pub fn write_pid_file(path: &Path) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let mut file = options.open(path)?;
    write!(file, "{}", std::process::id())
}

pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("BOOTSTRAP | Unable to remove pid file {}: {e}", path.display());
    }
}
