//! Field layouts shared by command encoding and message decoding.
//!
//! All multi-byte integers are big-endian on the wire.

use bytes::{Buf, BufMut};

use crate::constants::ADDRESS_MODE_IEEE;
use crate::error::ProtocolError;
use crate::value::{Payload, Value};

/// Wire representation of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// One byte.
    U8,
    /// Two bytes.
    U16,
    /// Four bytes.
    U32,
    /// Eight bytes.
    U64,
    /// A short (u16) or IEEE (u64) address, chosen by an earlier mode field.
    Address {
        /// Name of the address mode field.
        mode: &'static str,
    },
    /// One length byte followed by that many bytes.
    LenPrefixedBytes,
    /// All remaining bytes.
    Bytes,
}

/// A named field in a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// Field name.
    pub name: &'static str,
    /// Wire representation.
    pub kind: ParamKind,
}

impl ParamSpec {
    /// Create a field spec.
    pub const fn new(name: &'static str, kind: ParamKind) -> Self {
        ParamSpec { name, kind }
    }
}

/// Serialize payload fields in layout order.
pub fn encode_fields(
    owner: &'static str,
    params: &[ParamSpec],
    payload: &Payload,
) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    for param in params {
        let value = payload.get(param.name).ok_or(ProtocolError::MissingField {
            command: owner,
            field: param.name,
        })?;
        let invalid = || ProtocolError::InvalidField {
            command: owner,
            field: param.name,
        };
        let number = || value.as_u64().ok_or_else(invalid);

        match param.kind {
            ParamKind::U8 => out.put_u8(u8::try_from(number()?).map_err(|_| invalid())?),
            ParamKind::U16 => out.put_u16(u16::try_from(number()?).map_err(|_| invalid())?),
            ParamKind::U32 => out.put_u32(u32::try_from(number()?).map_err(|_| invalid())?),
            ParamKind::U64 => out.put_u64(number()?),
            ParamKind::Address { mode } => {
                let mode = payload.get_u64(mode).ok_or(ProtocolError::MissingField {
                    command: owner,
                    field: mode,
                })?;
                if mode == u64::from(ADDRESS_MODE_IEEE) {
                    out.put_u64(number()?);
                } else {
                    out.put_u16(u16::try_from(number()?).map_err(|_| invalid())?);
                }
            }
            ParamKind::LenPrefixedBytes => {
                let bytes = value.as_bytes().ok_or_else(invalid)?;
                out.put_u8(u8::try_from(bytes.len()).map_err(|_| invalid())?);
                out.extend_from_slice(bytes);
            }
            ParamKind::Bytes => out.extend_from_slice(value.as_bytes().ok_or_else(invalid)?),
        }
    }
    Ok(out)
}

/// Deserialize fields in layout order. Bytes beyond the layout are ignored.
pub fn decode_fields(params: &[ParamSpec], data: &[u8]) -> Result<Payload, ProtocolError> {
    let total = data.len();
    let mut buf = data;
    let mut payload = Payload::new();

    let need = |buf: &[u8], n: usize| {
        if buf.remaining() < n {
            Err(ProtocolError::FrameTooShort {
                expected: total - buf.remaining() + n,
                actual: total,
            })
        } else {
            Ok(())
        }
    };

    for param in params {
        let value = match param.kind {
            ParamKind::U8 => {
                need(buf, 1)?;
                Value::U8(buf.get_u8())
            }
            ParamKind::U16 => {
                need(buf, 2)?;
                Value::U16(buf.get_u16())
            }
            ParamKind::U32 => {
                need(buf, 4)?;
                Value::U32(buf.get_u32())
            }
            ParamKind::U64 => {
                need(buf, 8)?;
                Value::U64(buf.get_u64())
            }
            ParamKind::Address { mode } => {
                if payload.get_u64(mode) == Some(u64::from(ADDRESS_MODE_IEEE)) {
                    need(buf, 8)?;
                    Value::U64(buf.get_u64())
                } else {
                    need(buf, 2)?;
                    Value::U16(buf.get_u16())
                }
            }
            ParamKind::LenPrefixedBytes => {
                need(buf, 1)?;
                let len = buf.get_u8() as usize;
                need(buf, len)?;
                let bytes = buf[..len].to_vec();
                buf.advance(len);
                Value::Bytes(bytes)
            }
            ParamKind::Bytes => {
                let bytes = buf.to_vec();
                buf.advance(bytes.len());
                Value::Bytes(bytes)
            }
        };
        payload.insert(param.name, value);
    }

    Ok(payload)
}
