//! The datagram transport interface consumed by the client.

use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;

/// Transport-layer errors, propagated to callers unchanged.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport closed")]
    Closed,
}

/// An unreliable datagram transport (UDP broadcast, or a routed
/// PAN/low-power transport).
///
/// A destination of `None` broadcasts to all nodes in the subnet.
/// Implementations deliver complete datagrams; fragmentation is the
/// transport's responsibility. Received datagrams are pushed into the
/// client through [`crate::ElClient::on_receive`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, dest: Option<SocketAddr>, payload: &[u8]) -> Result<(), TransportError>;
}
