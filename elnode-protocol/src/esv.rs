//! ECHONET Lite service codes.

use crate::error::ProtocolError;
use std::fmt;

/// ESV service codes.
///
/// Discriminants are the wire bytes. Codes in `0x50..=0x5E` are the
/// service-not-available (SNA) failure replies; `0x60..=0x6E` are
/// requests; `0x71..=0x7E` are success replies and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Esv {
    /// Write without response failed (reply to `SetI`).
    SetISna = 0x50,
    /// Write with response failed (reply to `SetC`).
    SetCSna = 0x51,
    /// Read failed (reply to `Get`).
    GetSna = 0x52,
    /// Notification request failed (reply to `InfReq`).
    InfSna = 0x53,
    /// Write-then-read failed (reply to `SetGet`).
    SetGetSna = 0x5E,
    /// Property write, no response requested.
    SetI = 0x60,
    /// Property write, response required.
    SetC = 0x61,
    /// Property read.
    Get = 0x62,
    /// Request a notification.
    InfReq = 0x63,
    /// Property write then read.
    SetGet = 0x6E,
    /// Write succeeded (reply to `SetC`).
    SetRes = 0x71,
    /// Read succeeded (reply to `Get`).
    GetRes = 0x72,
    /// Spontaneous notification.
    Inf = 0x73,
    /// Notification, response required.
    InfC = 0x74,
    /// Notification acknowledgement (reply to `InfC`).
    InfCRes = 0x7A,
    /// Write-then-read succeeded (reply to `SetGet`).
    SetGetRes = 0x7E,
}

impl Esv {
    /// Returns the wire byte.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns true for the SetGet family, which carries two operation
    /// lists on the wire.
    pub const fn is_set_get_family(self) -> bool {
        matches!(self, Esv::SetGet | Esv::SetGetRes | Esv::SetGetSna)
    }

    /// Returns true for service codes that answer an earlier request
    /// (success replies and SNA variants). These are routed to the
    /// transaction tracker and never dispatched as inbound requests.
    pub const fn is_response(self) -> bool {
        matches!(
            self,
            Esv::SetISna
                | Esv::SetCSna
                | Esv::GetSna
                | Esv::InfSna
                | Esv::SetGetSna
                | Esv::SetRes
                | Esv::GetRes
                | Esv::InfCRes
                | Esv::SetGetRes
        )
    }

    /// Returns the SNA variant answering this request, if any.
    pub const fn sna(self) -> Option<Esv> {
        match self {
            Esv::SetI => Some(Esv::SetISna),
            Esv::SetC => Some(Esv::SetCSna),
            Esv::Get => Some(Esv::GetSna),
            Esv::InfReq => Some(Esv::InfSna),
            Esv::SetGet => Some(Esv::SetGetSna),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Esv {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x50 => Ok(Esv::SetISna),
            0x51 => Ok(Esv::SetCSna),
            0x52 => Ok(Esv::GetSna),
            0x53 => Ok(Esv::InfSna),
            0x5E => Ok(Esv::SetGetSna),
            0x60 => Ok(Esv::SetI),
            0x61 => Ok(Esv::SetC),
            0x62 => Ok(Esv::Get),
            0x63 => Ok(Esv::InfReq),
            0x6E => Ok(Esv::SetGet),
            0x71 => Ok(Esv::SetRes),
            0x72 => Ok(Esv::GetRes),
            0x73 => Ok(Esv::Inf),
            0x74 => Ok(Esv::InfC),
            0x7A => Ok(Esv::InfCRes),
            0x7E => Ok(Esv::SetGetRes),
            other => Err(ProtocolError::UnknownEsv(other)),
        }
    }
}

impl fmt::Display for Esv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Esv::SetISna => "SetI_SNA",
            Esv::SetCSna => "SetC_SNA",
            Esv::GetSna => "Get_SNA",
            Esv::InfSna => "INF_SNA",
            Esv::SetGetSna => "SetGet_SNA",
            Esv::SetI => "SetI",
            Esv::SetC => "SetC",
            Esv::Get => "Get",
            Esv::InfReq => "INF_REQ",
            Esv::SetGet => "SetGet",
            Esv::SetRes => "Set_Res",
            Esv::GetRes => "Get_Res",
            Esv::Inf => "INF",
            Esv::InfC => "INFC",
            Esv::InfCRes => "INFC_Res",
            Esv::SetGetRes => "SetGet_Res",
        };
        f.write_str(name)
    }
}
