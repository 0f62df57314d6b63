//! Model-change event bus.

use crate::node::RemoteNode;
use crate::object::EchonetObject;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use elnode_protocol::Eoj;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default event channel capacity.
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Kind of a collection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionChange {
    Added,
    Removed,
}

/// Events emitted by the model and the discovery sequence.
#[derive(Debug, Clone)]
pub enum Event {
    /// A remote address was observed for the first time.
    NodeJoined { node: Arc<RemoteNode> },
    /// An instance-list notification from `node` is being processed.
    InstanceListUpdating { node: Arc<RemoteNode> },
    /// Property maps are about to be read for the listed instances.
    InstanceListPropertyMapAcquiring {
        node: Arc<RemoteNode>,
        instances: Vec<Eoj>,
    },
    /// Instance-list processing for `node` finished.
    InstanceListUpdated {
        node: Arc<RemoteNode>,
        instances: Vec<Eoj>,
    },
    /// Property-map acquisition for one object started.
    PropertyMapAcquiring {
        node: Arc<RemoteNode>,
        device: Arc<EchonetObject>,
    },
    /// Property-map acquisition for one object completed.
    PropertyMapAcquired {
        node: Arc<RemoteNode>,
        device: Arc<EchonetObject>,
    },
    /// A property value was written. Fires on every write, including
    /// writes of the unchanged value (`old == new`).
    PropertyValueUpdated {
        object: Arc<EchonetObject>,
        epc: u8,
        old: Option<Bytes>,
        new: Bytes,
        previous_updated_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    },
    /// A property was added to or removed from an object.
    PropertiesChanged {
        object: Arc<EchonetObject>,
        change: CollectionChange,
        epc: u8,
    },
    /// A device object was added to or removed from a node. `node` is
    /// `None` for the self node.
    DevicesChanged {
        node: Option<Arc<RemoteNode>>,
        change: CollectionChange,
        device: Arc<EchonetObject>,
    },
}

/// Broadcast bus for model events.
///
/// A single channel carries every event; consumers filter by variant.
/// Sending never blocks and never fails: with no subscribers the event is
/// simply dropped.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to all events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publishes an event to all current subscribers.
    pub fn notify(&self, event: Event) {
        let _ = self.sender.send(event);
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
