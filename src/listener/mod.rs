pub mod http;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::pipeline::StatKeeper;

/// Entry point of the pipeline: accepts data from clients and pushes it
/// into the sink it was loaded with.
#[async_trait]
pub trait Listener: StatKeeper {
    fn name(&self) -> &str;

    /// Address the listener is bound to, once bound.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Stops accepting new requests and waits for in-flight ones.
    async fn close(&self);
}
