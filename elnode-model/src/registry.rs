//! Thread-safe remote-node registry.

use crate::events::{Event, EventBus};
use crate::node::RemoteNode;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Mapping from remote address to remote node.
///
/// Insertion is atomic: two concurrent messages from the same new
/// address produce exactly one node and exactly one node-joined event.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: DashMap<SocketAddr, Arc<RemoteNode>>,
    events: Arc<EventBus>,
}

impl NodeRegistry {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            nodes: DashMap::new(),
            events,
        }
    }

    /// Looks up the node for an address.
    pub fn try_find(&self, address: SocketAddr) -> Option<Arc<RemoteNode>> {
        self.nodes.get(&address).map(|entry| entry.clone())
    }

    /// Returns the node for an address, inserting a fresh one if absent.
    /// The second element reports whether a node was created; creation
    /// fires a node-joined event.
    pub fn try_add(&self, address: SocketAddr) -> (Arc<RemoteNode>, bool) {
        let mut added = false;
        let node = self
            .nodes
            .entry(address)
            .or_insert_with(|| {
                added = true;
                RemoteNode::new(address, self.events.clone())
            })
            .clone();
        if added {
            debug!(%address, "remote node joined");
            self.events.notify(Event::NodeJoined { node: node.clone() });
        }
        (node, added)
    }

    /// Removes a node. Nodes are destroyed only by explicit removal.
    pub fn remove(&self, address: SocketAddr) -> Option<Arc<RemoteNode>> {
        self.nodes.remove(&address).map(|(_, node)| node)
    }

    /// Snapshot of all known nodes.
    pub fn nodes(&self) -> Vec<Arc<RemoteNode>> {
        self.nodes.iter().map(|entry| entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
