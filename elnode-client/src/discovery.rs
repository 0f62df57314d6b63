//! The discovery sequence: instance-list announcement and property-map
//! acquisition.

use crate::client::ElClient;
use crate::error::ClientError;
use crate::handler::EPC_INSTANCE_LIST;
use bytes::Bytes;
use elnode_model::{EchonetObject, Event, RemoteNode};
use elnode_protocol::{Eoj, InstanceList, PropertyMap, PropertyOp};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Status-announcement property map.
const EPC_ANNOUNCE_MAP: u8 = 0x9D;
/// Set property map.
const EPC_SET_MAP: u8 = 0x9E;
/// Get property map.
const EPC_GET_MAP: u8 = 0x9F;

/// Observer hooks for [`ElClient::request_instance_list_with`]. Any hook
/// returning `true` completes the awaited request.
pub trait InstanceListObserver: Send + Sync {
    /// Instance-list processing started for a node.
    fn updating(&self, node: &Arc<RemoteNode>) -> bool {
        let _ = node;
        false
    }

    /// One object's property maps were acquired.
    fn property_map_acquired(&self, node: &Arc<RemoteNode>, device: &Arc<EchonetObject>) -> bool {
        let _ = (node, device);
        false
    }

    /// Instance-list processing finished for a node.
    fn updated(&self, node: &Arc<RemoteNode>, instances: &[Eoj]) -> bool {
        let _ = (node, instances);
        false
    }
}

impl ElClient {
    /// Announces the self node: refreshes the node profile's
    /// instance-list property (EPC 0xD5) and broadcasts it from node
    /// profile to node profile.
    pub async fn announce_self(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        let list = InstanceList::new(self.self_node.instance_eojs())?;
        let value = Bytes::from(list.encode_padded());

        let profile = self.self_node.profile();
        let property = profile.ensure_property(EPC_INSTANCE_LIST);
        profile.store_in(&property, value.clone())?;

        self.notify(
            profile.eoj(),
            None,
            Eoj::NODE_PROFILE,
            vec![PropertyOp::new(EPC_INSTANCE_LIST, value)],
            cancel,
        )
        .await
    }

    /// Broadcasts an INF_REQ for the instance list (EPC 0xD5). Answers
    /// arrive as INF notifications and feed instance-list processing.
    pub async fn request_instance_list(&self, cancel: &CancellationToken) -> Result<(), ClientError> {
        self.request_notification(
            self.self_node.profile().eoj(),
            None,
            Eoj::NODE_PROFILE,
            &[EPC_INSTANCE_LIST],
            cancel,
        )
        .await
    }

    /// Sends the instance-list request and waits until one of the
    /// observer hooks returns `true` or the token is cancelled.
    pub async fn request_instance_list_with(
        &self,
        observer: &dyn InstanceListObserver,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        // Subscribe before sending so no event can be missed.
        let mut events = self.events.subscribe();
        self.request_instance_list(cancel).await?;

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                event = events.recv() => event,
            };
            let done = match event {
                Ok(Event::InstanceListUpdating { node }) => observer.updating(&node),
                Ok(Event::PropertyMapAcquired { node, device }) => {
                    observer.property_map_acquired(&node, &device)
                }
                Ok(Event::InstanceListUpdated { node, instances }) => {
                    observer.updated(&node, &instances)
                }
                Ok(_) => false,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "instance-list observer lagged behind the event bus");
                    false
                }
                Err(RecvError::Closed) => return Err(ClientError::Cancelled),
            };
            if done {
                return Ok(());
            }
        }
    }

    /// Processes an EPC 0xD5 notification from a remote node profile:
    /// materializes the announced device objects, then acquires property
    /// maps for every object that still lacks them, the node profile
    /// included.
    pub(crate) async fn process_instance_list(
        self: Arc<Self>,
        node: Arc<RemoteNode>,
        payload: Bytes,
    ) {
        let list = match InstanceList::decode(&payload) {
            Ok(list) => list,
            Err(error) => {
                warn!(address = %node.address(), %error, "dropping invalid instance list");
                return;
            }
        };
        self.events.notify(Event::InstanceListUpdating { node: node.clone() });

        let instances = list.eojs().to_vec();
        for &eoj in &instances {
            node.ensure_object(eoj);
        }

        let pending: Vec<Arc<EchonetObject>> = node
            .devices()
            .into_iter()
            .filter(|object| !object.property_maps_acquired())
            .collect();
        self.events.notify(Event::InstanceListPropertyMapAcquiring {
            node: node.clone(),
            instances: pending.iter().map(|object| object.eoj()).collect(),
        });

        for object in pending {
            if let Err(error) = self.acquire_property_maps(&node, &object).await {
                warn!(
                    address = %node.address(),
                    eoj = %object.eoj(),
                    %error,
                    "property-map acquisition aborted"
                );
            }
        }

        if !node.profile().property_maps_acquired() {
            let profile = node.profile().clone();
            if let Err(error) = self.acquire_property_maps(&node, &profile).await {
                warn!(
                    address = %node.address(),
                    %error,
                    "node-profile property-map acquisition aborted"
                );
            }
        }

        self.events.notify(Event::InstanceListUpdated { node, instances });
    }

    /// Reads EPCs 0x9D/0x9E/0x9F from one object and applies the merged
    /// capability flags.
    ///
    /// A timeout or an SNA answer aborts the acquisition without
    /// raising; an undecodable map is a protocol violation by the remote
    /// and surfaces as an error.
    async fn acquire_property_maps(
        &self,
        node: &Arc<RemoteNode>,
        object: &Arc<EchonetObject>,
    ) -> Result<(), ClientError> {
        self.events.notify(Event::PropertyMapAcquiring {
            node: node.clone(),
            device: object.clone(),
        });

        let cancel = CancellationToken::new();
        let read = self.get(
            self.self_node.profile().eoj(),
            Some(node.address()),
            object.eoj(),
            &[EPC_ANNOUNCE_MAP, EPC_SET_MAP, EPC_GET_MAP],
            &cancel,
        );
        let (ok, returns) =
            match tokio::time::timeout(self.config.property_map_acquire_timeout(), read).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!(address = %node.address(), eoj = %object.eoj(), "property-map read timed out");
                    return Ok(());
                }
            };
        if !ok {
            debug!(address = %node.address(), eoj = %object.eoj(), "property-map read answered with SNA");
            return Ok(());
        }

        let mut announce = None;
        let mut set = None;
        let mut get = None;
        for op in &returns {
            let map = PropertyMap::decode(&op.edt).map_err(|_| ClientError::InvalidPropertyMap {
                epc: op.epc,
                address: node.address(),
            })?;
            match op.epc {
                EPC_ANNOUNCE_MAP => announce = Some(map),
                EPC_SET_MAP => set = Some(map),
                EPC_GET_MAP => get = Some(map),
                _ => {}
            }
        }
        let (Some(announce), Some(set), Some(get)) = (announce, set, get) else {
            return Err(ClientError::InvalidPropertyMap {
                epc: EPC_GET_MAP,
                address: node.address(),
            });
        };

        object.apply_property_maps(&get, &set, &announce);
        self.events.notify(Event::PropertyMapAcquired {
            node: node.clone(),
            device: object.clone(),
        });
        Ok(())
    }
}
