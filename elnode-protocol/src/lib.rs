//! # elnode-protocol
//!
//! Wire protocol implementation for ECHONET Lite.
//!
//! This crate provides:
//! - Binary frame encoding/decoding for both frame formats (Format 1 and
//!   Format 2)
//! - EOJ (ECHONET object identifier) and ESV (service code) types
//! - Property-map (EPC 0x9D/0x9E/0x9F) and instance-list (EPC 0xD5) codecs
//! - A hex JSON debug rendering used in round-trip tests

pub mod eoj;
pub mod error;
pub mod esv;
pub mod frame;
pub mod instance_list;
pub mod property_map;

pub use eoj::Eoj;
pub use error::ProtocolError;
pub use esv::Esv;
pub use frame::{Edata, Format1, Frame, Operations, PropertyOp};
pub use instance_list::InstanceList;
pub use property_map::PropertyMap;

/// EHD1 value identifying an ECHONET Lite frame.
pub const EHD1_ECHONET_LITE: u8 = 0x10;

/// EHD2 value for Format 1 (structured) EDATA.
pub const EHD2_FORMAT1: u8 = 0x81;

/// EHD2 value for Format 2 (arbitrary) EDATA.
pub const EHD2_FORMAT2: u8 = 0x82;

/// Default UDP port for ECHONET Lite.
pub const DEFAULT_UDP_PORT: u16 = 3610;

/// Maximum number of operations in one operation list (OPC is one byte).
pub const MAX_OPERATIONS: usize = 255;

/// Maximum EDT length in one operation (PDC is one byte).
pub const MAX_EDT_LEN: usize = 255;
