//! # elnode-client
//!
//! The stateful ECHONET Lite client: one instance participates as a node
//! on the network, acting as both initiator and responder for every
//! service.
//!
//! This crate provides:
//! - The outbound service engine (SetI, SetC, Get, SetGet, INF, INF_REQ,
//!   INFC) with response correlation and cancellation
//! - The inbound service engine with standards-mandated SNA replies
//! - The transaction tracker multiplexing in-flight services
//! - The discovery sequence (instance lists and property maps)
//! - The datagram transport trait consumed by the client
//! - Configuration with file and environment loading

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod tracker;
pub mod transport;

pub use client::ElClient;
pub use config::{ClientConfig, ConfigError, TransportProtocol};
pub use discovery::InstanceListObserver;
pub use error::ClientError;
pub use tracker::{PendingTransaction, ResponseFilter, ResponseMessage, TransactionTracker};
pub use transport::{Transport, TransportError};

#[cfg(test)]
pub(crate) mod testutil;
