//! The inbound service engine: request dispatch, ingest, and SNA
//! generation.

use crate::client::ElClient;
use crate::error::ClientError;
use elnode_model::{EchonetObject, RemoteNode};
use elnode_protocol::{Edata, Esv, Format1, Frame, PropertyOp};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{trace, warn};

/// EPC of the instance-list notification on the node profile.
pub(crate) const EPC_INSTANCE_LIST: u8 = 0xD5;

impl ElClient {
    /// Push-style receive entry point; the transport calls this once
    /// per datagram.
    ///
    /// Malformed frames are dropped silently. Pending transactions are
    /// completed synchronously, in receive order; request handling then
    /// runs as a fire-and-forget task whose failures are logged and
    /// never reach the receive path.
    pub async fn on_receive(&self, source: SocketAddr, payload: &[u8]) {
        let frame = match Frame::decode(payload) {
            Ok(frame) => frame,
            Err(error) => {
                trace!(%source, %error, "dropping malformed frame");
                return;
            }
        };
        let Edata::Format1(message) = frame.edata else {
            trace!(%source, tid = frame.tid, "ignoring Format 2 frame");
            return;
        };

        let consumed = self.tracker.dispatch(source, frame.tid, &message);
        if message.esv.is_response() {
            if !consumed {
                trace!(%source, tid = frame.tid, esv = %message.esv, "unmatched response");
            }
            return;
        }

        let Some(client) = self.weak_self.upgrade() else {
            return;
        };
        let tid = frame.tid;
        tokio::spawn(async move {
            if let Err(error) = client.handle_request(source, tid, message).await {
                warn!(%source, tid, %error, "inbound service handling failed");
            }
        });
    }

    async fn handle_request(
        &self,
        source: SocketAddr,
        tid: u16,
        message: Format1,
    ) -> Result<(), ClientError> {
        let (node, _) = self.registry.try_add(source);
        let destination = self.self_node.resolve(&message.deoj);

        match message.esv {
            Esv::SetI => self.handle_set_i(source, tid, &message, destination).await,
            Esv::SetC => self.handle_set_c(source, tid, &message, destination).await,
            Esv::Get => self.handle_get(source, tid, &message, destination).await,
            Esv::SetGet => self.handle_set_get(source, tid, &message, destination).await,
            Esv::InfReq => self.handle_inf_req(source, tid, &message, destination).await,
            Esv::Inf => {
                self.ingest_notification(&node, &message);
                Ok(())
            }
            Esv::InfC => self.handle_infc(source, tid, &node, &message, destination).await,
            // Responses were already routed to the tracker.
            esv => {
                debug_assert!(esv.is_response());
                Ok(())
            }
        }
    }

    /// SetI (0x60): write without response. An absent destination object
    /// drops the request without an SNA; a reply is only generated when
    /// some operation was rejected.
    async fn handle_set_i(
        &self,
        source: SocketAddr,
        tid: u16,
        message: &Format1,
        destination: Option<Arc<EchonetObject>>,
    ) -> Result<(), ClientError> {
        let Some(object) = destination else {
            trace!(%source, deoj = %message.deoj, "SetI for unknown object dropped");
            return Ok(());
        };
        let (results, rejected) = self.apply_set_ops(&object, message.first_ops());
        if rejected {
            self.reply(source, tid, message, Esv::SetISna, results, None)
                .await?;
        }
        Ok(())
    }

    /// SetC (0x61): write with mandatory response. An absent destination
    /// object echoes every operation unchanged under `SetC_SNA`.
    async fn handle_set_c(
        &self,
        source: SocketAddr,
        tid: u16,
        message: &Format1,
        destination: Option<Arc<EchonetObject>>,
    ) -> Result<(), ClientError> {
        let (results, rejected) = match destination {
            Some(object) => self.apply_set_ops(&object, message.first_ops()),
            None => (message.first_ops().to_vec(), true),
        };
        let esv = if rejected { Esv::SetCSna } else { Esv::SetRes };
        self.reply(source, tid, message, esv, results, None).await
    }

    /// Get (0x62): read with mandatory response.
    async fn handle_get(
        &self,
        source: SocketAddr,
        tid: u16,
        message: &Format1,
        destination: Option<Arc<EchonetObject>>,
    ) -> Result<(), ClientError> {
        let (results, rejected) = self.apply_get_ops(destination.as_ref(), message.first_ops());
        let esv = if rejected { Esv::GetSna } else { Esv::GetRes };
        self.reply(source, tid, message, esv, results, None).await
    }

    /// SetGet (0x6E): SetI-style logic over the set-list, Get-style
    /// logic over the get-list; get results land in the second reply
    /// list.
    async fn handle_set_get(
        &self,
        source: SocketAddr,
        tid: u16,
        message: &Format1,
        destination: Option<Arc<EchonetObject>>,
    ) -> Result<(), ClientError> {
        let get_ops = message.second_ops().unwrap_or_default();
        let (set_results, set_rejected, get_results, get_rejected) = match destination {
            Some(object) => {
                let (set_results, set_rejected) = self.apply_set_ops(&object, message.first_ops());
                let (get_results, get_rejected) = self.apply_get_ops(Some(&object), get_ops);
                (set_results, set_rejected, get_results, get_rejected)
            }
            None => (message.first_ops().to_vec(), true, get_ops.to_vec(), true),
        };
        let esv = if set_rejected || get_rejected {
            Esv::SetGetSna
        } else {
            Esv::SetGetRes
        };
        self.reply(source, tid, message, esv, set_results, Some(get_results))
            .await
    }

    /// INF_REQ (0x63): answered with INF carrying the requested values,
    /// or INF_SNA on any per-property failure. An absent destination
    /// object drops the request like SetI.
    async fn handle_inf_req(
        &self,
        source: SocketAddr,
        tid: u16,
        message: &Format1,
        destination: Option<Arc<EchonetObject>>,
    ) -> Result<(), ClientError> {
        let Some(object) = destination else {
            trace!(%source, deoj = %message.deoj, "INF_REQ for unknown object dropped");
            return Ok(());
        };
        let mut results = Vec::with_capacity(message.first_ops().len());
        let mut rejected = false;
        for op in message.first_ops() {
            let value = if op.edt.is_empty() {
                object
                    .property(op.epc)
                    .filter(|property| property.can_announce() || property.can_get())
                    .and_then(|property| property.value())
            } else {
                None
            };
            match value {
                Some(value) => results.push(PropertyOp::new(op.epc, value)),
                None => {
                    rejected = true;
                    results.push(op.clone());
                }
            }
        }
        let esv = if rejected { Esv::InfSna } else { Esv::Inf };
        self.reply(source, tid, message, esv, results, None).await
    }

    /// INFC (0x74): ingests like INF and acknowledges with `INFC_Res`.
    /// When the destination object is absent the notification is still
    /// quietly retained, but no acknowledgement is sent.
    async fn handle_infc(
        &self,
        source: SocketAddr,
        tid: u16,
        node: &Arc<RemoteNode>,
        message: &Format1,
        destination: Option<Arc<EchonetObject>>,
    ) -> Result<(), ClientError> {
        self.ingest_notification(node, message);
        if destination.is_none() {
            trace!(%source, deoj = %message.deoj, "INFC for unknown object retained without ack");
            return Ok(());
        }
        let results = message
            .first_ops()
            .iter()
            .map(|op| PropertyOp::request(op.epc))
            .collect();
        self.reply(source, tid, message, Esv::InfCRes, results, None)
            .await
    }

    /// Ingest for INF/INFC: locate or create the source object and
    /// store every in-bounds value. An EPC 0xD5 notification from the
    /// node profile triggers instance-list processing.
    fn ingest_notification(&self, node: &Arc<RemoteNode>, message: &Format1) {
        let object = node.ensure_object(message.seoj);
        for op in message.first_ops() {
            let property = object.ensure_property(op.epc);
            if property.accepts(&op.edt) {
                if let Err(error) = object.store_in(&property, op.edt.clone()) {
                    warn!(address = %node.address(), epc = op.epc, %error, "failed to store notified value");
                }
            } else {
                warn!(
                    address = %node.address(),
                    epc = op.epc,
                    len = op.edt.len(),
                    "notified value violates size bounds"
                );
            }
        }

        if message.seoj.is_node_profile() {
            if let Some(op) = message
                .first_ops()
                .iter()
                .find(|op| op.epc == EPC_INSTANCE_LIST)
            {
                let Some(client) = self.weak_self.upgrade() else {
                    return;
                };
                let node = Arc::clone(node);
                let payload = op.edt.clone();
                tokio::spawn(async move {
                    client.process_instance_list(node, payload).await;
                });
            }
        }
    }

    /// Applies one write operation list against a local object.
    /// Accepted writes are acknowledged with a value-less operation;
    /// rejected ones echo the original operation including its EDT.
    fn apply_set_ops(
        &self,
        object: &Arc<EchonetObject>,
        ops: &[PropertyOp],
    ) -> (Vec<PropertyOp>, bool) {
        let mut results = Vec::with_capacity(ops.len());
        let mut rejected = false;
        for op in ops {
            let accepted = object
                .property(op.epc)
                .filter(|property| property.can_set() && property.accepts(&op.edt))
                .map(|property| object.store_in(&property, op.edt.clone()).is_ok())
                .unwrap_or(false);
            if accepted {
                results.push(PropertyOp::request(op.epc));
            } else {
                rejected = true;
                results.push(op.clone());
            }
        }
        (results, rejected)
    }

    /// Applies one read operation list against a local object. Requests
    /// carrying an EDT are malformed and rejected; readable properties
    /// with a stored value answer with it.
    fn apply_get_ops(
        &self,
        object: Option<&Arc<EchonetObject>>,
        ops: &[PropertyOp],
    ) -> (Vec<PropertyOp>, bool) {
        let Some(object) = object else {
            return (ops.to_vec(), !ops.is_empty());
        };
        let mut results = Vec::with_capacity(ops.len());
        let mut rejected = false;
        for op in ops {
            let value = if op.edt.is_empty() {
                object
                    .property(op.epc)
                    .filter(|property| property.can_get())
                    .and_then(|property| property.value())
            } else {
                None
            };
            match value {
                Some(value) => results.push(PropertyOp::new(op.epc, value)),
                None => {
                    rejected = true;
                    results.push(op.clone());
                }
            }
        }
        (results, rejected)
    }

    /// Sends a reply: SEOJ and DEOJ swap roles and the inbound TID is
    /// reused verbatim.
    async fn reply(
        &self,
        source: SocketAddr,
        tid: u16,
        request: &Format1,
        esv: Esv,
        ops: Vec<PropertyOp>,
        get_ops: Option<Vec<PropertyOp>>,
    ) -> Result<(), ClientError> {
        let message = match get_ops {
            Some(get_ops) => Format1::new_pair(request.deoj, request.seoj, esv, ops, get_ops)?,
            None => Format1::new(request.deoj, request.seoj, esv, ops)?,
        };
        self.send_frame(Some(source), &Frame::format1(tid, message))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{assert_nothing_sent, decode_sent, encode_frame, test_client, REMOTE};
    use elnode_model::{CollectionChange, Event};
    use elnode_protocol::Eoj;

    /// The self-hosted controller device from the test catalog.
    fn controller() -> Eoj {
        Eoj::new(0x05, 0xFF, 0x01)
    }

    fn remote_profile() -> Eoj {
        Eoj::NODE_PROFILE
    }

    fn format1(frame: &Frame) -> &Format1 {
        match &frame.edata {
            Edata::Format1(message) => message,
            Edata::Format2(_) => panic!("expected Format 1"),
        }
    }

    #[tokio::test]
    async fn test_set_c_rejects_out_of_range_edt() {
        let (client, mut sent) = test_client();
        // 0x80 takes exactly one byte; two bytes must be rejected.
        let request = Format1::new(
            remote_profile(),
            controller(),
            Esv::SetC,
            vec![PropertyOp::new(0x80, vec![0x30, 0x31])],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0042, request)).await;

        let (dest, reply) = decode_sent(&mut sent).await;
        assert_eq!(dest, Some(*REMOTE));
        assert_eq!(reply.tid, 0x0042);
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::SetCSna);
        assert_eq!(message.seoj, controller());
        assert_eq!(message.deoj, remote_profile());
        // The rejected operation echoes its original EDT.
        assert_eq!(message.first_ops(), [PropertyOp::new(0x80, vec![0x30, 0x31])]);

        // The local value is untouched.
        let object = client.self_node().device(&controller()).unwrap();
        assert!(object.property(0x80).unwrap().value().is_none());
    }

    #[tokio::test]
    async fn test_set_c_success() {
        let (client, mut sent) = test_client();
        let request = Format1::new(
            remote_profile(),
            controller(),
            Esv::SetC,
            vec![PropertyOp::new(0x80, vec![0x30])],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0007, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::SetRes);
        assert_eq!(message.first_ops(), [PropertyOp::request(0x80)]);

        let object = client.self_node().device(&controller()).unwrap();
        assert_eq!(object.property(0x80).unwrap().value().unwrap().as_ref(), [0x30]);
    }

    #[tokio::test]
    async fn test_set_c_unknown_object_echoes_everything() {
        let (client, mut sent) = test_client();
        let request = Format1::new(
            remote_profile(),
            Eoj::new(0x05, 0xFF, 0x09),
            Esv::SetC,
            vec![PropertyOp::new(0x80, vec![0x30])],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0001, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::SetCSna);
        assert_eq!(message.first_ops(), [PropertyOp::new(0x80, vec![0x30])]);
    }

    #[tokio::test]
    async fn test_set_i_silent_drop_on_unknown_object() {
        let (client, mut sent) = test_client();
        let request = Format1::new(
            remote_profile(),
            Eoj::new(0x05, 0xFF, 0x09),
            Esv::SetI,
            vec![PropertyOp::new(0x80, vec![0x30])],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0001, request)).await;
        assert_nothing_sent(&mut sent).await;
    }

    #[tokio::test]
    async fn test_set_i_accepted_writes_without_reply() {
        let (client, mut sent) = test_client();
        let mut events = client.subscribe();
        let request = Format1::new(
            remote_profile(),
            controller(),
            Esv::SetI,
            vec![PropertyOp::new(0x80, vec![0x31])],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0001, request)).await;

        // The write lands (observable through the event bus)...
        loop {
            match events.recv().await.unwrap() {
                Event::PropertyValueUpdated { epc: 0x80, new, .. } => {
                    assert_eq!(new.as_ref(), [0x31]);
                    break;
                }
                _ => continue,
            }
        }
        // ...and no reply is generated.
        assert_nothing_sent(&mut sent).await;
    }

    #[tokio::test]
    async fn test_set_i_partial_failure_replies_sna() {
        let (client, mut sent) = test_client();
        let request = Format1::new(
            remote_profile(),
            controller(),
            Esv::SetI,
            vec![
                PropertyOp::new(0x80, vec![0x31]),
                PropertyOp::new(0xDD, vec![0x01]),
            ],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0009, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::SetISna);
        // Accepted op acknowledged value-less, rejected op echoed.
        assert_eq!(
            message.first_ops(),
            [PropertyOp::request(0x80), PropertyOp::new(0xDD, vec![0x01])]
        );
    }

    #[tokio::test]
    async fn test_get_returns_current_values() {
        let (client, mut sent) = test_client();
        let object = client.self_node().device(&controller()).unwrap();
        object.store(0x80, bytes::Bytes::from_static(&[0x30])).unwrap();

        let request = Format1::new(
            remote_profile(),
            controller(),
            Esv::Get,
            vec![PropertyOp::request(0x80)],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0011, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::GetRes);
        assert_eq!(message.first_ops(), [PropertyOp::new(0x80, vec![0x30])]);
    }

    #[tokio::test]
    async fn test_get_rejects_unknown_epc_and_nonempty_edt() {
        let (client, mut sent) = test_client();
        let object = client.self_node().device(&controller()).unwrap();
        object.store(0x80, bytes::Bytes::from_static(&[0x30])).unwrap();

        let request = Format1::new(
            remote_profile(),
            controller(),
            Esv::Get,
            vec![
                PropertyOp::request(0xDD),
                // A Get carrying an EDT is malformed and rejected.
                PropertyOp::new(0x80, vec![0x00]),
            ],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0012, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::GetSna);
        assert_eq!(
            message.first_ops(),
            [PropertyOp::request(0xDD), PropertyOp::new(0x80, vec![0x00])]
        );
    }

    #[tokio::test]
    async fn test_get_unknown_object_echoes_all() {
        let (client, mut sent) = test_client();
        let request = Format1::new(
            remote_profile(),
            Eoj::new(0x05, 0xFF, 0x09),
            Esv::Get,
            vec![PropertyOp::request(0x80), PropertyOp::request(0xB0)],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0013, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::GetSna);
        assert_eq!(message.first_ops().len(), 2);
    }

    #[tokio::test]
    async fn test_set_get_routes_results_to_both_lists() {
        let (client, mut sent) = test_client();
        let object = client.self_node().device(&controller()).unwrap();
        object.store(0xE0, bytes::Bytes::from_static(&[0x10, 0x20])).unwrap();

        let request = Format1::new_pair(
            remote_profile(),
            controller(),
            Esv::SetGet,
            vec![PropertyOp::new(0x80, vec![0x30])],
            vec![PropertyOp::request(0xE0)],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0021, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::SetGetRes);
        assert_eq!(message.first_ops(), [PropertyOp::request(0x80)]);
        assert_eq!(
            message.second_ops().unwrap(),
            [PropertyOp::new(0xE0, vec![0x10, 0x20])]
        );
    }

    #[tokio::test]
    async fn test_set_get_partial_failure() {
        let (client, mut sent) = test_client();
        let request = Format1::new_pair(
            remote_profile(),
            controller(),
            Esv::SetGet,
            vec![PropertyOp::new(0x80, vec![0x30])],
            // 0xE0 has no stored value yet: the read side fails.
            vec![PropertyOp::request(0xE0)],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0022, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::SetGetSna);
        assert_eq!(message.first_ops(), [PropertyOp::request(0x80)]);
        assert_eq!(message.second_ops().unwrap(), [PropertyOp::request(0xE0)]);
    }

    #[tokio::test]
    async fn test_inf_ingests_into_source_object() {
        let (client, mut sent) = test_client();
        let notification = Format1::new(
            Eoj::new(0x01, 0x30, 0x01),
            remote_profile(),
            Esv::Inf,
            vec![PropertyOp::new(0x80, vec![0x31])],
        )
        .unwrap();
        client
            .on_receive(*REMOTE, &encode_frame(0x0031, notification))
            .await;

        // Ingest runs on a spawned task; poll until the value lands.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            let value = client
                .registry()
                .try_find(*REMOTE)
                .and_then(|node| node.device(&Eoj::new(0x01, 0x30, 0x01)))
                .and_then(|object| object.property(0x80))
                .and_then(|property| property.value());
            if let Some(value) = value {
                assert_eq!(value.as_ref(), [0x31]);
                break;
            }
            assert!(std::time::Instant::now() < deadline, "value never stored");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        // Notifications draw no reply.
        assert_nothing_sent(&mut sent).await;
    }

    #[tokio::test]
    async fn test_infc_acks_with_valueless_echo() {
        let (client, mut sent) = test_client();
        let notification = Format1::new(
            Eoj::new(0x01, 0x30, 0x01),
            controller(),
            Esv::InfC,
            vec![PropertyOp::new(0x80, vec![0x31])],
        )
        .unwrap();
        client
            .on_receive(*REMOTE, &encode_frame(0x0033, notification))
            .await;

        let (dest, reply) = decode_sent(&mut sent).await;
        assert_eq!(dest, Some(*REMOTE));
        assert_eq!(reply.tid, 0x0033);
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::InfCRes);
        assert_eq!(message.first_ops(), [PropertyOp::request(0x80)]);

        // The notified value was ingested into the source object model.
        let node = client.registry().try_find(*REMOTE).unwrap();
        let object = node.device(&Eoj::new(0x01, 0x30, 0x01)).unwrap();
        assert_eq!(object.property(0x80).unwrap().value().unwrap().as_ref(), [0x31]);
    }

    #[tokio::test]
    async fn test_infc_unknown_destination_quietly_retains() {
        let (client, mut sent) = test_client();
        let notification = Format1::new(
            Eoj::new(0x01, 0x30, 0x01),
            Eoj::new(0x05, 0xFF, 0x09),
            Esv::InfC,
            vec![PropertyOp::new(0x80, vec![0x32])],
        )
        .unwrap();
        client
            .on_receive(*REMOTE, &encode_frame(0x0034, notification))
            .await;

        // No acknowledgement...
        assert_nothing_sent(&mut sent).await;
        // ...but the value was retained.
        let node = client.registry().try_find(*REMOTE).unwrap();
        let object = node.device(&Eoj::new(0x01, 0x30, 0x01)).unwrap();
        assert_eq!(object.property(0x80).unwrap().value().unwrap().as_ref(), [0x32]);
    }

    #[tokio::test]
    async fn test_inf_req_answers_with_inf() {
        let (client, mut sent) = test_client();
        let object = client.self_node().device(&controller()).unwrap();
        object.store(0x80, bytes::Bytes::from_static(&[0x30])).unwrap();

        let request = Format1::new(
            remote_profile(),
            controller(),
            Esv::InfReq,
            vec![PropertyOp::request(0x80)],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0035, request)).await;

        let (dest, reply) = decode_sent(&mut sent).await;
        assert_eq!(dest, Some(*REMOTE));
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::Inf);
        assert_eq!(message.first_ops(), [PropertyOp::new(0x80, vec![0x30])]);
    }

    #[tokio::test]
    async fn test_inf_req_failure_answers_with_inf_sna() {
        let (client, mut sent) = test_client();
        let request = Format1::new(
            remote_profile(),
            controller(),
            Esv::InfReq,
            vec![PropertyOp::request(0xDD)],
        )
        .unwrap();
        client.on_receive(*REMOTE, &encode_frame(0x0036, request)).await;

        let (_, reply) = decode_sent(&mut sent).await;
        let message = format1(&reply);
        assert_eq!(message.esv, Esv::InfSna);
        assert_eq!(message.first_ops(), [PropertyOp::request(0xDD)]);
    }

    #[tokio::test]
    async fn test_malformed_frame_dropped_silently() {
        let (client, mut sent) = test_client();
        client.on_receive(*REMOTE, &[0xFF, 0x00, 0x01]).await;
        client.on_receive(*REMOTE, &[]).await;
        assert_nothing_sent(&mut sent).await;
        assert!(client.registry().is_empty());
    }

    #[tokio::test]
    async fn test_node_joined_once_for_concurrent_frames() {
        let (client, mut sent) = test_client();
        let mut events = client.subscribe();

        let frame_bytes = |tid: u16| {
            encode_frame(
                tid,
                Format1::new(
                    Eoj::new(0x01, 0x30, 0x01),
                    remote_profile(),
                    Esv::Inf,
                    vec![PropertyOp::new(0x80, vec![0x31])],
                )
                .unwrap(),
            )
        };

        let tasks: Vec<_> = (0..2)
            .map(|i| {
                let client = client.clone();
                let bytes = frame_bytes(i as u16 + 1);
                tokio::spawn(async move { client.on_receive(*REMOTE, &bytes).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut joined = 0;
        while let Ok(event) =
            tokio::time::timeout(std::time::Duration::from_millis(200), events.recv()).await
        {
            if let Ok(Event::NodeJoined { .. }) = event {
                joined += 1;
            }
        }
        assert_eq!(joined, 1);
        assert_eq!(client.registry().len(), 1);
        assert_nothing_sent(&mut sent).await;
    }

    #[tokio::test]
    async fn test_properties_changed_event_on_dynamic_discovery() {
        let (client, _sent) = test_client();
        let mut events = client.subscribe();

        let notification = Format1::new(
            Eoj::new(0x01, 0x30, 0x01),
            remote_profile(),
            Esv::Inf,
            vec![PropertyOp::new(0xB0, vec![0x42])],
        )
        .unwrap();
        client
            .on_receive(*REMOTE, &encode_frame(0x0040, notification))
            .await;

        loop {
            match events.recv().await.unwrap() {
                Event::PropertiesChanged { change, epc, .. } => {
                    assert_eq!(change, CollectionChange::Added);
                    assert_eq!(epc, 0xB0);
                    break;
                }
                _ => continue,
            }
        }
    }
}
