//! Property state: value, timestamp, capabilities.

use crate::error::ModelError;
use crate::spec::PropertySpec;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// The result of one property write: old and new value with their
/// update times. `old` equals `new` when the same value is written
/// again; the write still counts as an update.
#[derive(Debug, Clone)]
pub struct PropertyValueChange {
    pub old: Option<Bytes>,
    pub new: Bytes,
    pub previous_updated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ValueState {
    value: Option<Bytes>,
    updated_at: Option<DateTime<Utc>>,
}

/// One property of an ECHONET object.
///
/// Each property serializes its own updates; value reads return a cheap
/// snapshot. Capability flags may be rewritten after construction when
/// property maps are acquired.
#[derive(Debug)]
pub struct Property {
    epc: u8,
    can_get: AtomicBool,
    can_set: AtomicBool,
    can_announce: AtomicBool,
    /// Known EDT size bounds, from the static catalog.
    min_size: Option<usize>,
    max_size: Option<usize>,
    state: RwLock<ValueState>,
}

impl Property {
    /// Creates a property with no capabilities and unknown size bounds,
    /// as discovered dynamically on remote objects.
    pub fn new(epc: u8) -> Self {
        Self::with_capabilities(epc, false, false, false)
    }

    /// Creates a property with explicit capability flags.
    pub fn with_capabilities(epc: u8, can_get: bool, can_set: bool, can_announce: bool) -> Self {
        Self {
            epc,
            can_get: AtomicBool::new(can_get),
            can_set: AtomicBool::new(can_set),
            can_announce: AtomicBool::new(can_announce),
            min_size: None,
            max_size: None,
            state: RwLock::new(ValueState::default()),
        }
    }

    /// Creates a property from its static spec, inheriting capability
    /// flags and size bounds.
    pub fn from_spec(spec: &PropertySpec) -> Self {
        Self {
            epc: spec.epc,
            can_get: AtomicBool::new(spec.can_get),
            can_set: AtomicBool::new(spec.can_set),
            can_announce: AtomicBool::new(spec.can_announce),
            min_size: spec.min_size,
            max_size: spec.max_size,
            state: RwLock::new(ValueState::default()),
        }
    }

    pub fn epc(&self) -> u8 {
        self.epc
    }

    pub fn can_get(&self) -> bool {
        self.can_get.load(Ordering::Acquire)
    }

    pub fn can_set(&self) -> bool {
        self.can_set.load(Ordering::Acquire)
    }

    pub fn can_announce(&self) -> bool {
        self.can_announce.load(Ordering::Acquire)
    }

    /// Rewrites the capability flags, as derived from property maps.
    pub fn set_capabilities(&self, can_get: bool, can_set: bool, can_announce: bool) {
        self.can_get.store(can_get, Ordering::Release);
        self.can_set.store(can_set, Ordering::Release);
        self.can_announce.store(can_announce, Ordering::Release);
    }

    /// Known EDT size bounds as (min, max).
    pub fn size_bounds(&self) -> (Option<usize>, Option<usize>) {
        (self.min_size, self.max_size)
    }

    /// Returns true when a value of this length satisfies the known
    /// size bounds.
    pub fn accepts(&self, value: &[u8]) -> bool {
        self.min_size.map_or(true, |min| value.len() >= min)
            && self.max_size.map_or(true, |max| value.len() <= max)
    }

    /// Returns a snapshot of the current value.
    pub fn value(&self) -> Option<Bytes> {
        self.state.read().value.clone()
    }

    /// Returns the time of the last update.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().updated_at
    }

    /// Writes a new value, enforcing the size bounds when known.
    pub fn set_value(&self, value: Bytes) -> Result<PropertyValueChange, ModelError> {
        if !self.accepts(&value) {
            return Err(ModelError::ValueOutOfRange {
                epc: self.epc,
                len: value.len(),
                min: self.min_size,
                max: self.max_size,
            });
        }
        let updated_at = Utc::now();
        let mut state = self.state.write();
        let change = PropertyValueChange {
            old: state.value.replace(value.clone()),
            new: value,
            previous_updated_at: state.updated_at.replace(updated_at),
            updated_at,
        };
        Ok(change)
    }
}
