//! Binary frame codec for ECHONET Lite.
//!
//! Frame layout (Format 1):
//!
//! ```text
//! +------+------+---------+---------+---------+-----+-----+------------------+
//! | EHD1 | EHD2 | TID     | SEOJ    | DEOJ    | ESV | OPC | EPC PDC EDT ...  |
//! | 0x10 | 0x81 | 2 bytes | 3 bytes | 3 bytes | 1   | 1   | per operation    |
//! +------+------+---------+---------+---------+-----+-----+------------------+
//! ```
//!
//! The TID travels little-endian. SetGet-family services append a second
//! `OPC2 | EPC PDC EDT ...` list. Format 2 (`EHD2 = 0x82`) carries an
//! opaque payload after the TID.

use crate::eoj::Eoj;
use crate::error::ProtocolError;
use crate::esv::Esv;
use crate::{EHD1_ECHONET_LITE, EHD2_FORMAT1, EHD2_FORMAT2, MAX_EDT_LEN, MAX_OPERATIONS};
use bytes::{BufMut, Bytes, BytesMut};
use serde_json::{json, Value};

/// One property operation: EPC plus EDT payload. PDC is derived from the
/// EDT length and is not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyOp {
    /// Property code.
    pub epc: u8,
    /// Property value bytes; empty for value-less operations (PDC 0).
    pub edt: Bytes,
}

impl PropertyOp {
    /// Creates an operation carrying a value.
    pub fn new(epc: u8, edt: impl Into<Bytes>) -> Self {
        Self {
            epc,
            edt: edt.into(),
        }
    }

    /// Creates a value-less operation (PDC 0), as used by Get requests
    /// and per-property success acknowledgements.
    pub fn request(epc: u8) -> Self {
        Self {
            epc,
            edt: Bytes::new(),
        }
    }

    /// The PDC byte value for this operation.
    pub fn pdc(&self) -> usize {
        self.edt.len()
    }
}

/// The operation lists of a Format-1 message: a single list for most
/// services, a set/get pair for the SetGet family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operations {
    Single(Vec<PropertyOp>),
    Pair {
        set: Vec<PropertyOp>,
        get: Vec<PropertyOp>,
    },
}

/// A Format-1 (structured) message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format1 {
    pub seoj: Eoj,
    pub deoj: Eoj,
    pub esv: Esv,
    pub operations: Operations,
}

impl Format1 {
    /// Creates a single-list message. Fails if the ESV belongs to the
    /// SetGet family, which requires two lists.
    pub fn new(
        seoj: Eoj,
        deoj: Eoj,
        esv: Esv,
        ops: Vec<PropertyOp>,
    ) -> Result<Self, ProtocolError> {
        if esv.is_set_get_family() {
            return Err(ProtocolError::OperationListMismatch(esv));
        }
        Ok(Self {
            seoj,
            deoj,
            esv,
            operations: Operations::Single(ops),
        })
    }

    /// Creates a two-list (SetGet-family) message. Fails for any other
    /// ESV.
    pub fn new_pair(
        seoj: Eoj,
        deoj: Eoj,
        esv: Esv,
        set: Vec<PropertyOp>,
        get: Vec<PropertyOp>,
    ) -> Result<Self, ProtocolError> {
        if !esv.is_set_get_family() {
            return Err(ProtocolError::OperationListMismatch(esv));
        }
        Ok(Self {
            seoj,
            deoj,
            esv,
            operations: Operations::Pair { set, get },
        })
    }

    /// The single or first (set) operation list.
    pub fn first_ops(&self) -> &[PropertyOp] {
        match &self.operations {
            Operations::Single(ops) => ops,
            Operations::Pair { set, .. } => set,
        }
    }

    /// The second (get) operation list, present for the SetGet family.
    pub fn second_ops(&self) -> Option<&[PropertyOp]> {
        match &self.operations {
            Operations::Single(_) => None,
            Operations::Pair { get, .. } => Some(get),
        }
    }
}

/// The EDATA variant. EHD2 is derived from the variant on encode, so a
/// frame can never disagree with its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edata {
    Format1(Format1),
    Format2(Bytes),
}

/// A complete ECHONET Lite frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Transaction identifier (host order; little-endian on the wire).
    pub tid: u16,
    pub edata: Edata,
}

impl Frame {
    /// Creates a Format-1 frame.
    pub fn format1(tid: u16, message: Format1) -> Self {
        Self {
            tid,
            edata: Edata::Format1(message),
        }
    }

    /// Creates a Format-2 frame with an opaque payload.
    pub fn format2(tid: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            tid,
            edata: Edata::Format2(payload.into()),
        }
    }

    /// Encodes the frame into `out`. Returns the number of bytes written.
    pub fn encode(&self, out: &mut BytesMut) -> Result<usize, ProtocolError> {
        let start = out.len();
        out.put_u8(EHD1_ECHONET_LITE);
        match &self.edata {
            Edata::Format1(message) => {
                out.put_u8(EHD2_FORMAT1);
                out.put_u16_le(self.tid);
                out.put_slice(&message.seoj.to_bytes());
                out.put_slice(&message.deoj.to_bytes());
                out.put_u8(message.esv.code());
                encode_ops(out, message.first_ops())?;
                if let Some(get) = message.second_ops() {
                    encode_ops(out, get)?;
                }
            }
            Edata::Format2(payload) => {
                out.put_u8(EHD2_FORMAT2);
                out.put_u16_le(self.tid);
                out.put_slice(payload);
            }
        }
        Ok(out.len() - start)
    }

    /// Decodes a frame from a complete datagram.
    ///
    /// Strict: any length underrun, unknown header byte, unknown ESV, or
    /// trailing garbage after the last operation list is an error.
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        let mut cursor = Cursor::new(buf);
        let ehd1 = cursor.u8()?;
        if ehd1 != EHD1_ECHONET_LITE {
            return Err(ProtocolError::UnknownEhd1(ehd1));
        }
        let ehd2 = cursor.u8()?;
        let tid = cursor.u16_le()?;

        let edata = match ehd2 {
            EHD2_FORMAT1 => {
                let seoj = Eoj::from_bytes(cursor.array()?);
                let deoj = Eoj::from_bytes(cursor.array()?);
                let esv = Esv::try_from(cursor.u8()?)?;
                let first = decode_ops(&mut cursor)?;
                let operations = if esv.is_set_get_family() {
                    let second = decode_ops(&mut cursor)?;
                    Operations::Pair {
                        set: first,
                        get: second,
                    }
                } else {
                    Operations::Single(first)
                };
                if cursor.remaining() != 0 {
                    return Err(ProtocolError::TrailingBytes(cursor.remaining()));
                }
                Edata::Format1(Format1 {
                    seoj,
                    deoj,
                    esv,
                    operations,
                })
            }
            EHD2_FORMAT2 => Edata::Format2(Bytes::copy_from_slice(cursor.rest())),
            other => return Err(ProtocolError::UnknownEhd2(other)),
        };

        Ok(Self { tid, edata })
    }

    /// Hex JSON rendering used in round-trip tests.
    ///
    /// EHD1/EHD2 are two-digit upper-hex strings; the TID is rendered as
    /// four upper-hex digits in wire (byte-swapped) order, so TID
    /// `0x0001` renders as `"0100"`.
    pub fn to_debug_json(&self) -> Value {
        let [tid_lo, tid_hi] = self.tid.to_le_bytes();
        let (ehd2, edata) = match &self.edata {
            Edata::Format1(message) => (EHD2_FORMAT1, format1_debug_json(message)),
            Edata::Format2(payload) => (EHD2_FORMAT2, json!({ "payload": hex(payload) })),
        };
        json!({
            "EHD1": format!("{:02X}", EHD1_ECHONET_LITE),
            "EHD2": format!("{:02X}", ehd2),
            "TID": format!("{:02X}{:02X}", tid_lo, tid_hi),
            "EDATA": edata,
        })
    }
}

fn format1_debug_json(message: &Format1) -> Value {
    let ops_json = |ops: &[PropertyOp]| -> Value {
        ops.iter()
            .map(|op| {
                json!({
                    "EPC": format!("{:02X}", op.epc),
                    "PDC": format!("{:02X}", op.pdc()),
                    "EDT": hex(&op.edt),
                })
            })
            .collect()
    };
    let mut value = json!({
        "SEOJ": message.seoj.to_hex(),
        "DEOJ": message.deoj.to_hex(),
        "ESV": format!("{:02X}", message.esv.code()),
        "OPCList": ops_json(message.first_ops()),
    });
    if let Some(get) = message.second_ops() {
        value["OPCGetList"] = ops_json(get);
    }
    value
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn encode_ops(out: &mut BytesMut, ops: &[PropertyOp]) -> Result<(), ProtocolError> {
    if ops.len() > MAX_OPERATIONS {
        return Err(ProtocolError::TooManyOperations(ops.len()));
    }
    out.put_u8(ops.len() as u8);
    for op in ops {
        if op.edt.len() > MAX_EDT_LEN {
            return Err(ProtocolError::EdtTooLong {
                epc: op.epc,
                len: op.edt.len(),
            });
        }
        out.put_u8(op.epc);
        out.put_u8(op.edt.len() as u8);
        out.put_slice(&op.edt);
    }
    Ok(())
}

fn decode_ops(cursor: &mut Cursor<'_>) -> Result<Vec<PropertyOp>, ProtocolError> {
    let opc = cursor.u8()? as usize;
    let mut ops = Vec::with_capacity(opc);
    for _ in 0..opc {
        let epc = cursor.u8()?;
        let pdc = cursor.u8()? as usize;
        let edt = Bytes::copy_from_slice(cursor.take(pdc)?);
        ops.push(PropertyOp { epc, edt });
    }
    Ok(ops)
}

/// Bounds-checked reader over a datagram. Every read validates the
/// remaining length first, so underruns surface as errors instead of
/// panics.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    fn u16_le(&mut self) -> Result<u16, ProtocolError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        // take() already validated the length
        Ok(self.take(N)?.try_into().unwrap())
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: &Frame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn test_encode_set_i() {
        let message = Format1::new(
            Eoj::NODE_PROFILE,
            Eoj::new(0x05, 0xFF, 0x01),
            Esv::SetI,
            vec![PropertyOp::new(0x80, vec![0x30])],
        )
        .unwrap();
        let frame = Frame::format1(0x0001, message);

        assert_eq!(
            encode(&frame),
            [0x10, 0x81, 0x01, 0x00, 0x0E, 0xF0, 0x01, 0x05, 0xFF, 0x01, 0x60, 0x01, 0x80, 0x01, 0x30]
        );
    }

    #[test]
    fn test_encode_get_property_maps() {
        let message = Format1::new(
            Eoj::NODE_PROFILE,
            Eoj::NODE_PROFILE,
            Esv::Get,
            vec![
                PropertyOp::request(0x9D),
                PropertyOp::request(0x9E),
                PropertyOp::request(0x9F),
            ],
        )
        .unwrap();
        let frame = Frame::format1(0x1234, message);

        assert_eq!(
            encode(&frame),
            [0x10, 0x81, 0x34, 0x12, 0x0E, 0xF0, 0x01, 0x0E, 0xF0, 0x01, 0x62, 0x03, 0x9D, 0x00, 0x9E, 0x00, 0x9F, 0x00]
        );
    }

    #[test]
    fn test_format1_roundtrip() {
        let message = Format1::new(
            Eoj::new(0x01, 0x30, 0x01),
            Eoj::NODE_PROFILE,
            Esv::Inf,
            vec![
                PropertyOp::new(0x80, vec![0x31]),
                PropertyOp::new(0xE0, vec![0x12, 0x34, 0x56]),
                PropertyOp::request(0x9F),
            ],
        )
        .unwrap();
        let frame = Frame::format1(0xBEEF, message);

        let decoded = Frame::decode(&encode(&frame)).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_set_get_roundtrip() {
        let message = Format1::new_pair(
            Eoj::NODE_PROFILE,
            Eoj::new(0x02, 0x90, 0x01),
            Esv::SetGet,
            vec![PropertyOp::new(0x80, vec![0x30])],
            vec![PropertyOp::request(0xB0), PropertyOp::request(0xB6)],
        )
        .unwrap();
        let frame = Frame::format1(0x00FF, message);

        let bytes = encode(&frame);
        // OPC1=1 then OPC2=2
        assert_eq!(bytes[11], 0x01);
        assert_eq!(bytes[15], 0x02);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_format2_roundtrip() {
        let frame = Frame::format2(0x0102, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        let bytes = encode(&frame);
        assert_eq!(&bytes[..4], [0x10, 0x82, 0x02, 0x01]);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_list_arity_enforced() {
        assert!(matches!(
            Format1::new(Eoj::NODE_PROFILE, Eoj::NODE_PROFILE, Esv::SetGet, vec![]),
            Err(ProtocolError::OperationListMismatch(Esv::SetGet))
        ));
        assert!(matches!(
            Format1::new_pair(
                Eoj::NODE_PROFILE,
                Eoj::NODE_PROFILE,
                Esv::Get,
                vec![],
                vec![]
            ),
            Err(ProtocolError::OperationListMismatch(Esv::Get))
        ));
    }

    #[test]
    fn test_decode_unknown_headers() {
        assert!(matches!(
            Frame::decode(&[0x11, 0x81, 0x00, 0x00]),
            Err(ProtocolError::UnknownEhd1(0x11))
        ));
        assert!(matches!(
            Frame::decode(&[0x10, 0x80, 0x00, 0x00]),
            Err(ProtocolError::UnknownEhd2(0x80))
        ));
    }

    #[test]
    fn test_decode_underrun() {
        // Header claims one operation with PDC=4 but only 1 EDT byte follows.
        let bytes = [
            0x10, 0x81, 0x00, 0x00, 0x0E, 0xF0, 0x01, 0x05, 0xFF, 0x01, 0x62, 0x01, 0x80, 0x04,
            0x30,
        ];
        assert!(matches!(
            Frame::decode(&bytes),
            Err(ProtocolError::Truncated { .. })
        ));

        // Truncated inside the fixed header.
        assert!(matches!(
            Frame::decode(&[0x10, 0x81, 0x00]),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut bytes = vec![
            0x10, 0x81, 0x00, 0x00, 0x0E, 0xF0, 0x01, 0x05, 0xFF, 0x01, 0x62, 0x01, 0x80, 0x00,
        ];
        bytes.push(0xAA);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(ProtocolError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_decode_unknown_esv() {
        let bytes = [
            0x10, 0x81, 0x00, 0x00, 0x0E, 0xF0, 0x01, 0x05, 0xFF, 0x01, 0x40, 0x00,
        ];
        assert!(matches!(
            Frame::decode(&bytes),
            Err(ProtocolError::UnknownEsv(0x40))
        ));
    }

    #[test]
    fn test_encode_too_many_operations() {
        let ops = (0..256)
            .map(|i| PropertyOp::request(i as u8))
            .collect::<Vec<_>>();
        let message =
            Format1::new(Eoj::NODE_PROFILE, Eoj::new(0x05, 0xFF, 0x01), Esv::Get, ops).unwrap();
        let mut buf = BytesMut::new();
        assert!(matches!(
            Frame::format1(0, message).encode(&mut buf),
            Err(ProtocolError::TooManyOperations(256))
        ));
    }

    #[test]
    fn test_debug_json_tid_byte_swap() {
        let message = Format1::new(
            Eoj::NODE_PROFILE,
            Eoj::new(0x05, 0xFF, 0x01),
            Esv::SetI,
            vec![PropertyOp::new(0x80, vec![0x30])],
        )
        .unwrap();

        let value = Frame::format1(0x0001, message.clone()).to_debug_json();
        assert_eq!(value["TID"], "0100");
        assert_eq!(value["EHD1"], "10");
        assert_eq!(value["EHD2"], "81");

        let value = Frame::format1(0x0100, message.clone()).to_debug_json();
        assert_eq!(value["TID"], "0001");

        let value = Frame::format1(0xFFFF, message).to_debug_json();
        assert_eq!(value["TID"], "FFFF");
    }

    #[test]
    fn test_debug_json_edata() {
        let message = Format1::new(
            Eoj::NODE_PROFILE,
            Eoj::new(0x05, 0xFF, 0x01),
            Esv::SetI,
            vec![PropertyOp::new(0x80, vec![0x30])],
        )
        .unwrap();
        let value = Frame::format1(0x0001, message).to_debug_json();

        assert_eq!(value["EDATA"]["SEOJ"], "0EF001");
        assert_eq!(value["EDATA"]["DEOJ"], "05FF01");
        assert_eq!(value["EDATA"]["ESV"], "60");
        assert_eq!(value["EDATA"]["OPCList"][0]["EPC"], "80");
        assert_eq!(value["EDATA"]["OPCList"][0]["PDC"], "01");
        assert_eq!(value["EDATA"]["OPCList"][0]["EDT"], "30");
    }
}
