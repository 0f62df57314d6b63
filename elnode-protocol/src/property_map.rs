//! Property-map codec (EPCs 0x9D / 0x9E / 0x9F).
//!
//! Wire layout:
//!
//! - **Short form** (count ≤ 15): count byte followed by one byte per EPC.
//! - **Long form** (count ≥ 16): count byte followed by a 16-byte bitmap
//!   where bit `j` of byte `i` marks EPC `0x80 + 0x10·j + i`, covering the
//!   full `0x80..=0xFF` space.
//!
//! The count byte only selects the form on decode; it is not validated
//! against the bitmap population.

use crate::error::ProtocolError;
use std::collections::BTreeSet;

/// Largest EPC count encodable in the short form.
pub const SHORT_FORM_MAX: usize = 15;

/// Length of a long-form encoding (count byte + 16 bitmap bytes).
pub const LONG_FORM_LEN: usize = 17;

/// A set of EPCs as carried by the property-map properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyMap {
    epcs: BTreeSet<u8>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, epc: u8) -> bool {
        self.epcs.insert(epc)
    }

    pub fn contains(&self, epc: u8) -> bool {
        self.epcs.contains(&epc)
    }

    pub fn len(&self) -> usize {
        self.epcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epcs.is_empty()
    }

    /// Iterates the EPCs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.epcs.iter().copied()
    }

    /// Encodes the map, choosing the short form iff the count is ≤ 15.
    ///
    /// The long form can only express EPCs in `0x80..=0xFF`; an EPC below
    /// `0x80` in a map of more than 15 entries is an error.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let count = self.epcs.len();
        if count <= SHORT_FORM_MAX {
            let mut out = Vec::with_capacity(1 + count);
            out.push(count as u8);
            out.extend(self.epcs.iter());
            return Ok(out);
        }

        let mut bitmap = [0u8; 16];
        for &epc in &self.epcs {
            if epc < 0x80 {
                return Err(ProtocolError::PropertyMapEpcOutOfRange(epc));
            }
            let column = (epc & 0x0F) as usize;
            let row = (epc >> 4) - 0x08;
            bitmap[column] |= 1 << row;
        }
        let mut out = Vec::with_capacity(LONG_FORM_LEN);
        out.push(count as u8);
        out.extend_from_slice(&bitmap);
        Ok(out)
    }

    /// Decodes a property map from a property value.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some((&count, rest)) = bytes.split_first() else {
            return Err(ProtocolError::Truncated {
                needed: 1,
                remaining: 0,
            });
        };
        let count = count as usize;

        let mut epcs = BTreeSet::new();
        if count <= SHORT_FORM_MAX {
            if rest.len() != count {
                return Err(ProtocolError::Truncated {
                    needed: count,
                    remaining: rest.len(),
                });
            }
            epcs.extend(rest.iter().copied());
        } else {
            if rest.len() != 16 {
                return Err(ProtocolError::Truncated {
                    needed: 16,
                    remaining: rest.len(),
                });
            }
            for (column, &byte) in rest.iter().enumerate() {
                for row in 0..8u8 {
                    if byte & (1 << row) != 0 {
                        epcs.insert(0x80 + (row << 4) + column as u8);
                    }
                }
            }
        }
        Ok(Self { epcs })
    }
}

impl FromIterator<u8> for PropertyMap {
    fn from_iter<T: IntoIterator<Item = u8>>(iter: T) -> Self {
        Self {
            epcs: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PropertyMap {
    type Item = u8;
    type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.epcs.iter().copied()
    }
}
