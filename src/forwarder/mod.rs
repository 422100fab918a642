pub mod http;
pub mod log;

use async_trait::async_trait;

use crate::pipeline::{Sink, StatKeeper};

/// Last stage of the pipeline: relays datapoints and spans to one backend.
#[async_trait]
pub trait Forwarder: Sink + StatKeeper {
    fn name(&self) -> &str;

    /// Releases backend resources. Called once, after every listener stopped.
    async fn close(&self) {}
}
