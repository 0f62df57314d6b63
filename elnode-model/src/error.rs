//! Model error types.

use elnode_protocol::Eoj;
use thiserror::Error;

/// Errors raised by the object/property model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("value of {len} bytes for EPC {epc:#04x} is outside [{min:?}, {max:?}]")]
    ValueOutOfRange {
        epc: u8,
        len: usize,
        min: Option<usize>,
        max: Option<usize>,
    },

    #[error("object {eoj} has no property {epc:#04x}")]
    UnknownProperty { eoj: Eoj, epc: u8 },
}
