//! Self and remote node models.

use crate::events::{CollectionChange, Event, EventBus};
use crate::object::EchonetObject;
use crate::spec::ClassCatalog;
use dashmap::DashMap;
use elnode_protocol::Eoj;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};

/// The local node: exactly one per client. Hosts the node-profile object
/// and the device objects registered at construction.
#[derive(Debug)]
pub struct SelfNode {
    profile: Arc<EchonetObject>,
    devices: DashMap<Eoj, Arc<EchonetObject>>,
    events: Arc<EventBus>,
}

impl SelfNode {
    /// Creates the self node with its node profile (instance
    /// `instance_code`) and the given device objects, all spec-backed
    /// through the catalog.
    pub fn new(
        instance_code: u8,
        device_eojs: &[Eoj],
        catalog: &dyn ClassCatalog,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let profile_eoj = Eoj::new(0x0E, 0xF0, instance_code);
        let profile = EchonetObject::detailed(
            profile_eoj,
            catalog.class_or_synthetic(0x0E, 0xF0),
            None,
            events.clone(),
        );
        let devices = DashMap::new();
        for &eoj in device_eojs {
            let spec = catalog.class_or_synthetic(eoj.class_group, eoj.class);
            devices.insert(eoj, EchonetObject::detailed(eoj, spec, None, events.clone()));
        }
        Arc::new(Self {
            profile,
            devices,
            events,
        })
    }

    pub fn profile(&self) -> &Arc<EchonetObject> {
        &self.profile
    }

    pub fn device(&self, eoj: &Eoj) -> Option<Arc<EchonetObject>> {
        self.devices.get(eoj).map(|entry| entry.clone())
    }

    /// Snapshot of the device objects, ordered by EOJ.
    pub fn devices(&self) -> Vec<Arc<EchonetObject>> {
        let mut devices: Vec<_> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by_key(|object| object.eoj());
        devices
    }

    /// The EOJs of all hosted devices, as announced under EPC 0xD5.
    pub fn instance_eojs(&self) -> Vec<Eoj> {
        self.devices().iter().map(|object| object.eoj()).collect()
    }

    /// Resolves an inbound destination EOJ: the node profile answers for
    /// its class (any instance), devices answer for their exact EOJ.
    pub fn resolve(&self, deoj: &Eoj) -> Option<Arc<EchonetObject>> {
        if deoj.is_node_profile() {
            return Some(self.profile.clone());
        }
        self.device(deoj)
    }

    /// Registers an additional device object.
    pub fn add_device(&self, eoj: Eoj, catalog: &dyn ClassCatalog) -> Arc<EchonetObject> {
        let mut created = false;
        let device = self
            .devices
            .entry(eoj)
            .or_insert_with(|| {
                created = true;
                let spec = catalog.class_or_synthetic(eoj.class_group, eoj.class);
                EchonetObject::detailed(eoj, spec, None, self.events.clone())
            })
            .clone();
        if created {
            self.events.notify(Event::DevicesChanged {
                node: None,
                change: CollectionChange::Added,
                device: device.clone(),
            });
        }
        device
    }

    /// Removes a device object. Objects are destroyed only by explicit
    /// removal.
    pub fn remove_device(&self, eoj: &Eoj) -> Option<Arc<EchonetObject>> {
        let removed = self.devices.remove(eoj).map(|(_, device)| device);
        if let Some(device) = &removed {
            self.events.notify(Event::DevicesChanged {
                node: None,
                change: CollectionChange::Removed,
                device: device.clone(),
            });
        }
        removed
    }
}

/// A remote node, keyed by its transport address.
#[derive(Debug)]
pub struct RemoteNode {
    address: SocketAddr,
    profile: Arc<EchonetObject>,
    devices: DashMap<Eoj, Arc<EchonetObject>>,
    events: Arc<EventBus>,
    /// Self-handle for event payloads.
    weak_self: Weak<RemoteNode>,
}

impl RemoteNode {
    /// Creates a remote node with an undetailed node-profile object.
    pub fn new(address: SocketAddr, events: Arc<EventBus>) -> Arc<Self> {
        let profile = EchonetObject::undetailed(Eoj::NODE_PROFILE, Some(address), events.clone());
        Arc::new_cyclic(|weak_self| Self {
            address,
            profile,
            devices: DashMap::new(),
            events,
            weak_self: weak_self.clone(),
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn profile(&self) -> &Arc<EchonetObject> {
        &self.profile
    }

    pub fn device(&self, eoj: &Eoj) -> Option<Arc<EchonetObject>> {
        self.devices.get(eoj).map(|entry| entry.clone())
    }

    /// Snapshot of the device objects, ordered by EOJ.
    pub fn devices(&self) -> Vec<Arc<EchonetObject>> {
        let mut devices: Vec<_> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by_key(|object| object.eoj());
        devices
    }

    /// Resolves an EOJ referenced by a message from this node.
    pub fn resolve(&self, eoj: &Eoj) -> Option<Arc<EchonetObject>> {
        if eoj.is_node_profile() {
            return Some(self.profile.clone());
        }
        self.device(eoj)
    }

    /// Returns the object for an EOJ, creating an undetailed device
    /// object on first reference. Creation fires a devices-changed
    /// event.
    pub fn ensure_object(&self, eoj: Eoj) -> Arc<EchonetObject> {
        if eoj.is_node_profile() {
            return self.profile.clone();
        }
        let mut created = false;
        let device = self
            .devices
            .entry(eoj)
            .or_insert_with(|| {
                created = true;
                EchonetObject::undetailed(eoj, Some(self.address), self.events.clone())
            })
            .clone();
        if created {
            self.emit_devices_changed(CollectionChange::Added, device.clone());
        }
        device
    }

    /// Removes a device object. Objects are destroyed only by explicit
    /// removal.
    pub fn remove_object(&self, eoj: &Eoj) -> Option<Arc<EchonetObject>> {
        let removed = self.devices.remove(eoj).map(|(_, device)| device);
        if let Some(device) = &removed {
            self.emit_devices_changed(CollectionChange::Removed, device.clone());
        }
        removed
    }

    fn emit_devices_changed(&self, change: CollectionChange, device: Arc<EchonetObject>) {
        if let Some(node) = self.weak_self.upgrade() {
            self.events.notify(Event::DevicesChanged {
                node: Some(node),
                change,
                device,
            });
        }
    }
}
