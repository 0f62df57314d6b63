//! Instance-list codec (the EPC 0xD5 / 0xD6 payload).
//!
//! Wire layout: a count byte followed by three bytes per EOJ, at most 84
//! entries. The stored property value is conventionally padded with
//! zeroes to the 253-byte maximum; the decoder ignores anything past the
//! announced count.

use crate::eoj::Eoj;
use crate::error::ProtocolError;

/// Maximum number of instances in one list.
pub const MAX_INSTANCES: usize = 84;

/// Encoded length of a full, padded list (1 + 84 × 3).
pub const MAX_ENCODED_LEN: usize = 1 + MAX_INSTANCES * 3;

/// The device-instance list announced by a node profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceList {
    eojs: Vec<Eoj>,
}

impl InstanceList {
    pub fn new(eojs: Vec<Eoj>) -> Result<Self, ProtocolError> {
        if eojs.len() > MAX_INSTANCES {
            return Err(ProtocolError::InstanceListTooLong(eojs.len()));
        }
        Ok(Self { eojs })
    }

    pub fn eojs(&self) -> &[Eoj] {
        &self.eojs
    }

    pub fn len(&self) -> usize {
        self.eojs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eojs.is_empty()
    }

    /// Minimal encoding: count byte plus three bytes per EOJ.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.eojs.len() * 3);
        out.push(self.eojs.len() as u8);
        for eoj in &self.eojs {
            out.extend_from_slice(&eoj.to_bytes());
        }
        out
    }

    /// Encoding padded with zeroes to the 253-byte property-value size,
    /// as stored under EPC 0xD5.
    pub fn encode_padded(&self) -> Vec<u8> {
        let mut out = self.encode();
        out.resize(MAX_ENCODED_LEN, 0);
        out
    }

    /// Decodes a list from a property value; trailing padding is
    /// ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some((&count, rest)) = bytes.split_first() else {
            return Err(ProtocolError::Truncated {
                needed: 1,
                remaining: 0,
            });
        };
        let count = count as usize;
        if count > MAX_INSTANCES {
            return Err(ProtocolError::InstanceListTooLong(count));
        }
        if rest.len() < count * 3 {
            return Err(ProtocolError::Truncated {
                needed: count * 3,
                remaining: rest.len(),
            });
        }
        let eojs = rest
            .chunks_exact(3)
            .take(count)
            .map(|chunk| Eoj::new(chunk[0], chunk[1], chunk[2]))
            .collect();
        Ok(Self { eojs })
    }
}
