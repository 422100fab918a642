//! Periodic drain of internal counters.
//!
//! Every component that keeps counters implements [`StatKeeper`]. The
//! drainer collects them on a fixed delay and sends the datapoints straight
//! to the forwarders, so they skip the obfuscation stages.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::forwarder::Forwarder;
use crate::listener::Listener;
use crate::pipeline::{Datapoint, StatKeeper};

pub struct StatsDrainer {
    delay: Duration,
    forwarders: Vec<Arc<dyn Forwarder>>,
    listeners: Vec<Arc<dyn Listener>>,
    keepers: Vec<Arc<dyn StatKeeper>>,
    cancel_token: CancellationToken,
}

impl StatsDrainer {
    #[must_use]
    pub fn new(
        delay: Duration,
        forwarders: Vec<Arc<dyn Forwarder>>,
        listeners: Vec<Arc<dyn Listener>>,
        keepers: Vec<Arc<dyn StatKeeper>>,
    ) -> Self {
        Self {
            delay,
            forwarders,
            listeners,
            keepers,
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Current counters of every tracked component.
    #[must_use]
    pub fn collect(&self) -> Vec<Datapoint> {
        let mut points = Vec::new();
        for forwarder in &self.forwarders {
            points.extend(forwarder.stats());
        }
        for listener in &self.listeners {
            points.extend(listener.stats());
        }
        for keeper in &self.keepers {
            points.extend(keeper.stats());
        }
        points
    }

    /// Sends one round of counters to every forwarder.
    pub async fn drain_once(&self) {
        let points = self.collect();
        if points.is_empty() {
            return;
        }
        debug!("STATS | Draining {} datapoints", points.len());
        for forwarder in &self.forwarders {
            if let Err(e) = forwarder.add_datapoints(points.clone()).await {
                error!("STATS | Unable to send stats to {}: {e}", forwarder.name());
            }
        }
    }

    /// Drains every `delay` until cancelled.
    pub async fn spin(&self) {
        let mut interval = interval_at(Instant::now() + self.delay, self.delay);
        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!("STATS | Shutdown signal received, stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.drain_once().await;
                }
            }
        }
    }
}
