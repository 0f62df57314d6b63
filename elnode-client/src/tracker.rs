//! Pending-transaction tracking: TID allocation and response
//! correlation.

use crate::error::ClientError;
use dashmap::DashMap;
use elnode_protocol::{Eoj, Esv, Format1};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// A reply frame delivered to a waiting transaction.
#[derive(Debug, Clone)]
pub struct ResponseMessage {
    pub source: SocketAddr,
    pub message: Format1,
}

/// Predicate selecting the replies a pending transaction accepts.
#[derive(Debug, Clone)]
pub struct ResponseFilter {
    /// Expected reply source. `None` (broadcast request) accepts any
    /// address.
    pub source: Option<SocketAddr>,
    /// Destination object of the request; the reply's SEOJ must match
    /// (instance code `0x00` is a wildcard).
    pub deoj: Eoj,
    /// Accepted service codes.
    pub esvs: Vec<Esv>,
}

impl ResponseFilter {
    fn matches(&self, source: SocketAddr, message: &Format1) -> bool {
        self.source.map_or(true, |addr| addr == source)
            && self.deoj.matches(&message.seoj)
            && self.esvs.contains(&message.esv)
    }
}

#[derive(Debug)]
struct PendingEntry {
    handle_id: u64,
    filter: ResponseFilter,
    slot: oneshot::Sender<ResponseMessage>,
}

/// Allocates TIDs and correlates inbound responses with in-flight
/// requests.
#[derive(Debug)]
pub struct TransactionTracker {
    next_tid: AtomicU16,
    next_handle: AtomicU64,
    pending: DashMap<u16, PendingEntry>,
    /// Handed to waiters so their drop can deregister the filter.
    weak_self: Weak<TransactionTracker>,
}

impl TransactionTracker {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            next_tid: AtomicU16::new(0),
            next_handle: AtomicU64::new(0),
            pending: DashMap::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Allocates the next TID: pre-increment with 16-bit wraparound.
    pub fn allocate_tid(&self) -> u16 {
        self.next_tid
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }

    /// Registers a pending transaction. Must happen before the request
    /// is sent so the reply cannot race the registration.
    pub fn register(&self, tid: u16, filter: ResponseFilter) -> PendingTransaction {
        let handle_id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let (slot, rx) = oneshot::channel();
        self.pending.insert(
            tid,
            PendingEntry {
                handle_id,
                filter,
                slot,
            },
        );
        PendingTransaction {
            tid,
            handle_id,
            tracker: self.weak_self.clone(),
            rx,
        }
    }

    /// Offers an inbound Format-1 message to the registered filters.
    /// A matching transaction is completed and deregistered in one step.
    /// Returns whether a waiter consumed the message.
    pub fn dispatch(&self, source: SocketAddr, tid: u16, message: &Format1) -> bool {
        match self
            .pending
            .remove_if(&tid, |_, entry| entry.filter.matches(source, message))
        {
            Some((_, entry)) => {
                let _ = entry.slot.send(ResponseMessage {
                    source,
                    message: message.clone(),
                });
                true
            }
            None => false,
        }
    }

    fn deregister(&self, tid: u16, handle_id: u64) {
        // Guarded by the handle id: a TID reused after wraparound must
        // not be evicted by a stale waiter's drop.
        self.pending
            .remove_if(&tid, |_, entry| entry.handle_id == handle_id);
    }

    /// Number of in-flight transactions.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// A registered transaction awaiting its reply.
///
/// Dropping the handle deregisters the filter; a late matching frame is
/// then silently dropped.
#[derive(Debug)]
pub struct PendingTransaction {
    tid: u16,
    handle_id: u64,
    tracker: Weak<TransactionTracker>,
    rx: oneshot::Receiver<ResponseMessage>,
}

impl PendingTransaction {
    pub fn tid(&self) -> u16 {
        self.tid
    }

    /// Awaits the reply, honoring the cancellation token.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<ResponseMessage, ClientError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            reply = &mut self.rx => reply.map_err(|_| ClientError::Cancelled),
        }
    }
}

impl Drop for PendingTransaction {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.deregister(self.tid, self.handle_id);
        }
    }
}
