//! ECHONET objects.

use crate::error::ModelError;
use crate::events::{CollectionChange, Event, EventBus};
use crate::property::Property;
use crate::spec::ClassSpec;
use bytes::Bytes;
use dashmap::DashMap;
use elnode_protocol::{Eoj, PropertyMap};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// One ECHONET object, hosted locally or mirrored from a remote node.
///
/// An object is *detailed* when it was built from a static class spec
/// (fixed property set, known capabilities) and *undetailed* when its
/// properties are discovered dynamically from received messages and
/// property maps.
///
/// The owning node is referenced by address only (`None` for the self
/// node); objects never extend their owner's lifetime.
#[derive(Debug)]
pub struct EchonetObject {
    eoj: Eoj,
    detail: Option<Arc<ClassSpec>>,
    properties: DashMap<u8, Arc<Property>>,
    maps_acquired: AtomicBool,
    node_address: Option<SocketAddr>,
    events: Arc<EventBus>,
    /// Self-handle for event payloads.
    weak_self: Weak<EchonetObject>,
}

impl EchonetObject {
    /// Creates a detailed object, seeding its property set from the
    /// class spec. Detailed objects need no property-map acquisition.
    pub fn detailed(
        eoj: Eoj,
        spec: Arc<ClassSpec>,
        node_address: Option<SocketAddr>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let properties = DashMap::new();
        for prop_spec in &spec.properties {
            properties.insert(prop_spec.epc, Arc::new(Property::from_spec(prop_spec)));
        }
        Arc::new_cyclic(|weak_self| Self {
            eoj,
            detail: Some(spec),
            properties,
            maps_acquired: AtomicBool::new(true),
            node_address,
            events,
            weak_self: weak_self.clone(),
        })
    }

    /// Creates an undetailed object with an empty property set.
    pub fn undetailed(
        eoj: Eoj,
        node_address: Option<SocketAddr>,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            eoj,
            detail: None,
            properties: DashMap::new(),
            maps_acquired: AtomicBool::new(false),
            node_address,
            events,
            weak_self: weak_self.clone(),
        })
    }

    pub fn eoj(&self) -> Eoj {
        self.eoj
    }

    /// Address of the owning node; `None` for the self node.
    pub fn node_address(&self) -> Option<SocketAddr> {
        self.node_address
    }

    pub fn is_detailed(&self) -> bool {
        self.detail.is_some()
    }

    pub fn detail(&self) -> Option<&Arc<ClassSpec>> {
        self.detail.as_ref()
    }

    /// Whether the 0x9D/0x9E/0x9F property maps have been applied (or
    /// the object is spec-backed and needs none).
    pub fn property_maps_acquired(&self) -> bool {
        self.maps_acquired.load(Ordering::Acquire)
    }

    pub fn property(&self, epc: u8) -> Option<Arc<Property>> {
        self.properties.get(&epc).map(|entry| entry.clone())
    }

    /// Snapshot of the property collection, ordered by EPC.
    pub fn properties(&self) -> Vec<Arc<Property>> {
        let mut props: Vec<_> = self
            .properties
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        props.sort_by_key(|p| p.epc());
        props
    }

    /// Returns the property, creating it if absent. New properties start
    /// with capabilities and size bounds from the class spec when the
    /// spec knows the EPC, and blank otherwise. Creation fires a
    /// properties-changed event.
    pub fn ensure_property(&self, epc: u8) -> Arc<Property> {
        let mut created = false;
        let property = self
            .properties
            .entry(epc)
            .or_insert_with(|| {
                created = true;
                let property = match self.detail.as_ref().and_then(|spec| spec.property(epc)) {
                    Some(prop_spec) => Property::from_spec(prop_spec),
                    None => Property::new(epc),
                };
                Arc::new(property)
            })
            .clone();
        if created {
            self.emit_properties_changed(CollectionChange::Added, epc);
        }
        property
    }

    /// Removes a property. Objects and properties are destroyed only by
    /// explicit removal.
    pub fn remove_property(&self, epc: u8) -> Option<Arc<Property>> {
        let removed = self.properties.remove(&epc).map(|(_, prop)| prop);
        if removed.is_some() {
            self.emit_properties_changed(CollectionChange::Removed, epc);
        }
        removed
    }

    /// Writes a value to an existing property and publishes the
    /// value-updated event. Fails if the property is absent or the value
    /// violates its size bounds.
    pub fn store(&self, epc: u8, value: Bytes) -> Result<(), ModelError> {
        let property = self.property(epc).ok_or(ModelError::UnknownProperty {
            eoj: self.eoj,
            epc,
        })?;
        self.store_in(&property, value)
    }

    /// Writes a value to a property of this object and publishes the
    /// value-updated event.
    pub fn store_in(&self, property: &Property, value: Bytes) -> Result<(), ModelError> {
        let change = property.set_value(value)?;
        if let Some(object) = self.weak_self.upgrade() {
            self.events.notify(Event::PropertyValueUpdated {
                object,
                epc: property.epc(),
                old: change.old,
                new: change.new,
                previous_updated_at: change.previous_updated_at,
                updated_at: change.updated_at,
            });
        }
        Ok(())
    }

    /// Applies acquired property maps: EPCs named by any map are kept or
    /// created with the merged capability flags, EPCs named by none are
    /// removed. Existing values of surviving properties are retained.
    pub fn apply_property_maps(
        &self,
        get: &PropertyMap,
        set: &PropertyMap,
        announce: &PropertyMap,
    ) {
        let union: BTreeSet<u8> = get.iter().chain(set.iter()).chain(announce.iter()).collect();

        let stale: Vec<u8> = self
            .properties
            .iter()
            .map(|entry| *entry.key())
            .filter(|epc| !union.contains(epc))
            .collect();
        for epc in stale {
            self.remove_property(epc);
        }

        for epc in union {
            let property = self.ensure_property(epc);
            property.set_capabilities(get.contains(epc), set.contains(epc), announce.contains(epc));
        }

        self.maps_acquired.store(true, Ordering::Release);
    }

    fn emit_properties_changed(&self, change: CollectionChange, epc: u8) {
        if let Some(object) = self.weak_self.upgrade() {
            self.events.notify(Event::PropertiesChanged {
                object,
                change,
                epc,
            });
        }
    }
}
