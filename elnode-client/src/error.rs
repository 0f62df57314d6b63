//! Client error types.

use crate::transport::TransportError;
use elnode_model::ModelError;
use elnode_protocol::ProtocolError;
use std::net::SocketAddr;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("timed out waiting for a reply")]
    Timeout,

    #[error("operation list is empty")]
    EmptyOperationList,

    #[error("invalid property map under EPC {epc:#04x} from {address}")]
    InvalidPropertyMap { epc: u8, address: SocketAddr },
}

impl ClientError {
    /// Returns whether the operation may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout)
    }
}
