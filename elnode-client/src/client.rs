//! The ECHONET Lite client and its outbound service engine.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::tracker::{ResponseFilter, TransactionTracker};
use crate::transport::Transport;
use bytes::BytesMut;
use elnode_model::{ClassCatalog, Event, EventBus, NodeRegistry, SelfNode};
use elnode_protocol::{Eoj, Esv, Format1, Frame, PropertyOp};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Initial capacity of the shared encode buffer.
const ENCODE_BUFFER_CAPACITY: usize = 1024;

/// A stateful ECHONET Lite node client.
///
/// The client owns the self node, the registry of discovered remote
/// nodes, and every in-flight transaction. It is both initiator and
/// responder: outbound services go through the methods below, inbound
/// datagrams are pushed into [`ElClient::on_receive`].
pub struct ElClient {
    pub(crate) config: ClientConfig,
    transport: Arc<dyn Transport>,
    catalog: Arc<dyn ClassCatalog>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) self_node: Arc<SelfNode>,
    pub(crate) registry: Arc<NodeRegistry>,
    pub(crate) tracker: Arc<TransactionTracker>,
    /// The send mutex: owning it grants the shared encode buffer and
    /// serializes the transport send path, so frames leave in a total
    /// order.
    send_buf: Mutex<BytesMut>,
    /// Self-handle for spawning background handling from the receive
    /// path.
    pub(crate) weak_self: Weak<ElClient>,
}

impl ElClient {
    /// Creates a client hosting the node profile and the given device
    /// objects.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        catalog: Arc<dyn ClassCatalog>,
        device_eojs: &[Eoj],
    ) -> Arc<Self> {
        let events = Arc::new(EventBus::default());
        let self_node = SelfNode::new(
            config.self_node_instance_code,
            device_eojs,
            catalog.as_ref(),
            events.clone(),
        );
        let registry = Arc::new(NodeRegistry::new(events.clone()));
        Arc::new_cyclic(|weak_self| Self {
            config,
            transport,
            catalog,
            events,
            self_node,
            registry,
            tracker: TransactionTracker::new(),
            send_buf: Mutex::new(BytesMut::with_capacity(ENCODE_BUFFER_CAPACITY)),
            weak_self: weak_self.clone(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn self_node(&self) -> &Arc<SelfNode> {
        &self.self_node
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<dyn ClassCatalog> {
        &self.catalog
    }

    /// Subscribes to model and discovery events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Number of in-flight outbound transactions.
    pub fn pending_count(&self) -> usize {
        self.tracker.pending_count()
    }

    // =========================================================================
    // Send spine
    // =========================================================================

    /// Encodes and sends one frame under the send mutex. The buffer is
    /// reset before the mutex is released.
    pub(crate) async fn send_frame(
        &self,
        dest: Option<SocketAddr>,
        frame: &Frame,
    ) -> Result<(), ClientError> {
        let mut buf = self.send_buf.lock().await;
        buf.clear();
        frame.encode(&mut buf)?;
        debug!(tid = frame.tid, ?dest, "sending frame");
        let result = self.transport.send(dest, &buf).await;
        buf.clear();
        result.map_err(ClientError::from)
    }

    /// Sends a fire-and-forget frame, honoring the cancellation token.
    async fn send_plain(
        &self,
        dest: Option<SocketAddr>,
        frame: Frame,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.send_frame(dest, &frame) => result,
        }
    }

    fn validate_ops(ops: &[PropertyOp]) -> Result<(), ClientError> {
        if ops.is_empty() {
            return Err(ClientError::EmptyOperationList);
        }
        Ok(())
    }

    // =========================================================================
    // Outbound services
    // =========================================================================

    /// SetI (0x60): writes property values without requesting a
    /// response.
    ///
    /// The only reply this service can draw is `SetI_SNA` on partial
    /// failure, so the caller is expected to cancel after a grace
    /// period. On an SNA, operations returned with PDC 0 were accepted
    /// and are reflected to the local cache; the rejected ones are left
    /// untouched. On cancellation before any reply, every sent write is
    /// reflected optimistically (the device may well have accepted
    /// them) and the cancellation propagates.
    pub async fn set_i(
        &self,
        seoj: Eoj,
        dest: Option<SocketAddr>,
        deoj: Eoj,
        ops: Vec<PropertyOp>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyOp>, ClientError> {
        Self::validate_ops(&ops)?;
        let tid = self.tracker.allocate_tid();
        let pending = self.tracker.register(
            tid,
            ResponseFilter {
                source: dest,
                deoj,
                esvs: vec![Esv::SetISna],
            },
        );
        let message = Format1::new(seoj, deoj, Esv::SetI, ops.clone())?;
        self.send_frame(dest, &Frame::format1(tid, message)).await?;

        match pending.wait(cancel).await {
            Ok(reply) => {
                for op in reply.message.first_ops() {
                    if op.edt.is_empty() {
                        self.reflect_requested_write(reply.source, reply.message.seoj, &ops, op.epc);
                    }
                }
                Ok(reply.message.first_ops().to_vec())
            }
            Err(ClientError::Cancelled) => {
                if let Some(addr) = dest {
                    for op in &ops {
                        self.reflect_requested_write(addr, deoj, &ops, op.epc);
                    }
                }
                Err(ClientError::Cancelled)
            }
            Err(e) => Err(e),
        }
    }

    /// SetC (0x61): writes property values, response required.
    ///
    /// Returns `(success, returned operations)`; operations returned
    /// with PDC 0 were accepted and are reflected to the local cache.
    pub async fn set_c(
        &self,
        seoj: Eoj,
        dest: Option<SocketAddr>,
        deoj: Eoj,
        ops: Vec<PropertyOp>,
        cancel: &CancellationToken,
    ) -> Result<(bool, Vec<PropertyOp>), ClientError> {
        Self::validate_ops(&ops)?;
        let tid = self.tracker.allocate_tid();
        let pending = self.tracker.register(
            tid,
            ResponseFilter {
                source: dest,
                deoj,
                esvs: vec![Esv::SetRes, Esv::SetCSna],
            },
        );
        let message = Format1::new(seoj, deoj, Esv::SetC, ops.clone())?;
        self.send_frame(dest, &Frame::format1(tid, message)).await?;

        let reply = pending.wait(cancel).await?;
        for op in reply.message.first_ops() {
            if op.edt.is_empty() {
                self.reflect_requested_write(reply.source, reply.message.seoj, &ops, op.epc);
            }
        }
        Ok((
            reply.message.esv == Esv::SetRes,
            reply.message.first_ops().to_vec(),
        ))
    }

    /// Get (0x62): reads property values. Outgoing operations carry the
    /// EPC only (PDC 0).
    ///
    /// Returns `(success, returned operations)`; every returned
    /// operation with a value (PDC ≠ 0) replaces the local cache entry.
    pub async fn get(
        &self,
        seoj: Eoj,
        dest: Option<SocketAddr>,
        deoj: Eoj,
        epcs: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(bool, Vec<PropertyOp>), ClientError> {
        let ops: Vec<PropertyOp> = epcs.iter().map(|&epc| PropertyOp::request(epc)).collect();
        Self::validate_ops(&ops)?;
        let tid = self.tracker.allocate_tid();
        let pending = self.tracker.register(
            tid,
            ResponseFilter {
                source: dest,
                deoj,
                esvs: vec![Esv::GetRes, Esv::GetSna],
            },
        );
        let message = Format1::new(seoj, deoj, Esv::Get, ops)?;
        self.send_frame(dest, &Frame::format1(tid, message)).await?;

        let reply = pending.wait(cancel).await?;
        for op in reply.message.first_ops() {
            if !op.edt.is_empty() {
                self.reflect_read(reply.source, reply.message.seoj, op);
            }
        }
        Ok((
            reply.message.esv == Esv::GetRes,
            reply.message.first_ops().to_vec(),
        ))
    }

    /// SetGet (0x6E): writes the set-list, then reads the get-list.
    ///
    /// Returns `(success, set returns, get returns)`. Set-list
    /// operations returned with PDC 0 and get-list operations returned
    /// with a value are reflected to the local cache.
    pub async fn set_get(
        &self,
        seoj: Eoj,
        dest: Option<SocketAddr>,
        deoj: Eoj,
        set_ops: Vec<PropertyOp>,
        get_epcs: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(bool, Vec<PropertyOp>, Vec<PropertyOp>), ClientError> {
        Self::validate_ops(&set_ops)?;
        let get_ops: Vec<PropertyOp> = get_epcs
            .iter()
            .map(|&epc| PropertyOp::request(epc))
            .collect();
        Self::validate_ops(&get_ops)?;

        let tid = self.tracker.allocate_tid();
        let pending = self.tracker.register(
            tid,
            ResponseFilter {
                source: dest,
                deoj,
                esvs: vec![Esv::SetGetRes, Esv::SetGetSna],
            },
        );
        let message = Format1::new_pair(seoj, deoj, Esv::SetGet, set_ops.clone(), get_ops)?;
        self.send_frame(dest, &Frame::format1(tid, message)).await?;

        let reply = pending.wait(cancel).await?;
        let set_returns = reply.message.first_ops().to_vec();
        let get_returns = reply.message.second_ops().unwrap_or_default().to_vec();
        for op in &set_returns {
            if op.edt.is_empty() {
                self.reflect_requested_write(reply.source, reply.message.seoj, &set_ops, op.epc);
            }
        }
        for op in &get_returns {
            if !op.edt.is_empty() {
                self.reflect_read(reply.source, reply.message.seoj, op);
            }
        }
        Ok((
            reply.message.esv == Esv::SetGetRes,
            set_returns,
            get_returns,
        ))
    }

    /// INF_REQ (0x63): requests a notification. Fire-and-forget for the
    /// initiator; the answer arrives as INF and goes through the normal
    /// inbound path.
    pub async fn request_notification(
        &self,
        seoj: Eoj,
        dest: Option<SocketAddr>,
        deoj: Eoj,
        epcs: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let ops: Vec<PropertyOp> = epcs.iter().map(|&epc| PropertyOp::request(epc)).collect();
        Self::validate_ops(&ops)?;
        let tid = self.tracker.allocate_tid();
        let message = Format1::new(seoj, deoj, Esv::InfReq, ops)?;
        self.send_plain(dest, Frame::format1(tid, message), cancel)
            .await
    }

    /// INF (0x73): unsolicited notification; no reply is expected.
    pub async fn notify(
        &self,
        seoj: Eoj,
        dest: Option<SocketAddr>,
        deoj: Eoj,
        ops: Vec<PropertyOp>,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        Self::validate_ops(&ops)?;
        let tid = self.tracker.allocate_tid();
        let message = Format1::new(seoj, deoj, Esv::Inf, ops)?;
        self.send_plain(dest, Frame::format1(tid, message), cancel)
            .await
    }

    /// INFC (0x74): point-to-point notification with a mandatory
    /// `INFC_Res` acknowledgement. Broadcasting is forbidden, so the
    /// destination is a concrete address.
    ///
    /// Returns the acknowledgement's operation list.
    pub async fn notify_with_ack(
        &self,
        seoj: Eoj,
        dest: SocketAddr,
        deoj: Eoj,
        ops: Vec<PropertyOp>,
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyOp>, ClientError> {
        Self::validate_ops(&ops)?;
        let tid = self.tracker.allocate_tid();
        let pending = self.tracker.register(
            tid,
            ResponseFilter {
                source: Some(dest),
                deoj,
                esvs: vec![Esv::InfCRes],
            },
        );
        let message = Format1::new(seoj, deoj, Esv::InfC, ops)?;
        self.send_frame(Some(dest), &Frame::format1(tid, message))
            .await?;

        let reply = pending.wait(cancel).await?;
        Ok(reply.message.first_ops().to_vec())
    }

    // =========================================================================
    // Local cache reflection
    // =========================================================================

    /// Reflects an accepted write: the value we asked for under `epc`
    /// becomes the cached value of the peer's property.
    fn reflect_requested_write(
        &self,
        address: SocketAddr,
        eoj: Eoj,
        requested: &[PropertyOp],
        epc: u8,
    ) {
        let Some(value) = requested
            .iter()
            .find(|op| op.epc == epc)
            .map(|op| op.edt.clone())
        else {
            return;
        };
        let (node, _) = self.registry.try_add(address);
        let object = node.ensure_object(eoj);
        let property = object.ensure_property(epc);
        if let Err(error) = object.store_in(&property, value) {
            warn!(%address, %eoj, %error, "cannot reflect accepted write");
        }
    }

    /// Reflects a read result into the peer's cached property value.
    fn reflect_read(&self, address: SocketAddr, eoj: Eoj, op: &PropertyOp) {
        let (node, _) = self.registry.try_add(address);
        let object = node.ensure_object(eoj);
        let property = object.ensure_property(op.epc);
        if let Err(error) = object.store_in(&property, op.edt.clone()) {
            warn!(%address, %eoj, %error, "cannot reflect read value");
        }
    }
}

impl std::fmt::Debug for ElClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElClient")
            .field("config", &self.config)
            .field("pending", &self.tracker.pending_count())
            .field("nodes", &self.registry.len())
            .finish()
    }
}
