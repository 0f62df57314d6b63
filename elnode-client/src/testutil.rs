//! Shared test fixtures: a mock transport and a canned client.

use crate::client::ElClient;
use crate::config::ClientConfig;
use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use bytes::BytesMut;
use elnode_model::{ClassSpec, PropertySpec, StaticCatalog};
use elnode_protocol::{Eoj, Format1, Frame};
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// The remote peer used across client tests.
pub(crate) static REMOTE: LazyLock<SocketAddr> =
    LazyLock::new(|| "10.0.0.2:3610".parse().unwrap());

/// Transport that captures every sent datagram on a channel.
pub(crate) struct MockTransport {
    sent: mpsc::UnboundedSender<(Option<SocketAddr>, Vec<u8>)>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, dest: Option<SocketAddr>, payload: &[u8]) -> Result<(), TransportError> {
        self.sent
            .send((dest, payload.to_vec()))
            .map_err(|_| TransportError::Closed)
    }
}

pub(crate) type SentRx = mpsc::UnboundedReceiver<(Option<SocketAddr>, Vec<u8>)>;

/// A client hosting the node profile plus one controller device
/// (0x05,0xFF,0x01) whose operation-status property 0x80 takes exactly
/// one byte.
pub(crate) fn test_client() -> (Arc<ElClient>, SentRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    let catalog = StaticCatalog::new()
        .with_class(ClassSpec::new(
            0x0E,
            0xF0,
            vec![PropertySpec::new(0xD5).readable().announces()],
        ))
        .with_class(ClassSpec::new(
            0x05,
            0xFF,
            vec![
                PropertySpec::new(0x80)
                    .with_size(1, 1)
                    .readable()
                    .settable()
                    .announces(),
                PropertySpec::new(0xE0).with_size(1, 4).readable(),
            ],
        ));
    let client = ElClient::new(
        ClientConfig::default(),
        Arc::new(MockTransport { sent: tx }),
        Arc::new(catalog),
        &[Eoj::new(0x05, 0xFF, 0x01)],
    );
    (client, rx)
}

/// Awaits the next sent datagram and decodes it.
pub(crate) async fn decode_sent(rx: &mut SentRx) -> (Option<SocketAddr>, Frame) {
    let (dest, payload) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a send")
        .expect("transport closed");
    (dest, Frame::decode(&payload).expect("sent frame must decode"))
}

/// Asserts that nothing is sent within a short grace period.
pub(crate) async fn assert_nothing_sent(rx: &mut SentRx) {
    let result = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(result.is_err(), "unexpected send: {:?}", result);
}

/// Encodes a Format-1 frame into datagram bytes.
pub(crate) fn encode_frame(tid: u16, message: Format1) -> Vec<u8> {
    let mut buf = BytesMut::new();
    Frame::format1(tid, message)
        .encode(&mut buf)
        .expect("test frame must encode");
    buf.to_vec()
}
