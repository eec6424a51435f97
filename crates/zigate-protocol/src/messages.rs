//! Messages received from the coordinator.
//!
//! Every coordinator→host frame carries one trailing link-quality byte that
//! is counted in the frame length. [`Message::decode`] strips it into
//! [`Message::lqi`] before decoding the fields.

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::layout::{decode_fields, encode_fields, ParamKind, ParamSpec};
use crate::value::{FieldPath, Fields, Payload, Value};

/// Layout of one inbound message.
#[derive(Debug, Clone, Copy)]
pub struct MessageSpec {
    /// Message code.
    pub code: u16,
    /// Message name.
    pub name: &'static str,
    /// Field layout.
    pub fields: &'static [ParamSpec],
}

use ParamKind::*;

const STATUS: &[ParamSpec] = &[
    ParamSpec::new("status", U8),
    ParamSpec::new("sequence", U8),
    ParamSpec::new("packet_type", U16),
];

const VERSION: &[ParamSpec] = &[
    ParamSpec::new("major", U16),
    ParamSpec::new("installer", U16),
];

const NETWORK_STATE: &[ParamSpec] = &[
    ParamSpec::new("short_address", U16),
    ParamSpec::new("extended_address", U64),
    ParamSpec::new("pan_id", U16),
    ParamSpec::new("extended_pan_id", U64),
    ParamSpec::new("channel", U8),
];

const NETWORK_JOINED: &[ParamSpec] = &[
    ParamSpec::new("status", U8),
    ParamSpec::new("short_address", U16),
    ParamSpec::new("extended_address", U64),
    ParamSpec::new("channel", U8),
];

const STATUS_ONLY: &[ParamSpec] = &[ParamSpec::new("status", U8)];

const DATA_INDICATION: &[ParamSpec] = &[
    ParamSpec::new("status", U8),
    ParamSpec::new("profile_id", U16),
    ParamSpec::new("cluster_id", U16),
    ParamSpec::new("source_endpoint", U8),
    ParamSpec::new("destination_endpoint", U8),
    ParamSpec::new("source_address_mode", U8),
    ParamSpec::new("source_address", Address { mode: "source_address_mode" }),
    ParamSpec::new("destination_address_mode", U8),
    ParamSpec::new("destination_address", Address { mode: "destination_address_mode" }),
    ParamSpec::new("data", Bytes),
];

const DATA_CONFIRM: &[ParamSpec] = &[
    ParamSpec::new("status", U8),
    ParamSpec::new("source_endpoint", U8),
    ParamSpec::new("destination_endpoint", U8),
    ParamSpec::new("destination_address_mode", U8),
    ParamSpec::new("destination_address", Address { mode: "destination_address_mode" }),
    ParamSpec::new("sequence", U8),
];

const DEVICE_ANNOUNCE: &[ParamSpec] = &[
    ParamSpec::new("short_address", U16),
    ParamSpec::new("extended_address", U64),
    ParamSpec::new("mac_capability", U8),
];

const LEAVE_INDICATION: &[ParamSpec] = &[
    ParamSpec::new("extended_address", U64),
    ParamSpec::new("rejoin", U8),
];

const IEEE_ADDRESS_RESPONSE: &[ParamSpec] = &[
    ParamSpec::new("sequence", U8),
    ParamSpec::new("status", U8),
    ParamSpec::new("extended_address", U64),
    ParamSpec::new("short_address", U16),
    ParamSpec::new("device_count", U8),
    ParamSpec::new("start_index", U8),
    ParamSpec::new("associated", Bytes),
];

/// All message layouts the decoder understands.
pub const MESSAGES: &[MessageSpec] = &[
    MessageSpec { code: MSG_STATUS, name: "Status", fields: STATUS },
    MessageSpec { code: MSG_VERSION, name: "Version", fields: VERSION },
    MessageSpec { code: MSG_NETWORK_STATE, name: "NetworkState", fields: NETWORK_STATE },
    MessageSpec { code: MSG_NETWORK_JOINED, name: "NetworkJoined", fields: NETWORK_JOINED },
    MessageSpec { code: MSG_PERMIT_JOIN_STATUS, name: "PermitJoinStatus", fields: STATUS_ONLY },
    MessageSpec { code: MSG_RESTART_NON_FACTORY_NEW, name: "RestartNonFactoryNew", fields: STATUS_ONLY },
    MessageSpec { code: MSG_RESTART_FACTORY_NEW, name: "RestartFactoryNew", fields: STATUS_ONLY },
    MessageSpec { code: MSG_DATA_INDICATION, name: "DataIndication", fields: DATA_INDICATION },
    MessageSpec { code: MSG_DATA_CONFIRM, name: "DataConfirm", fields: DATA_CONFIRM },
    MessageSpec { code: MSG_DATA_CONFIRM_FAIL, name: "DataConfirmFail", fields: DATA_CONFIRM },
    MessageSpec { code: MSG_DEVICE_ANNOUNCE, name: "DeviceAnnounce", fields: DEVICE_ANNOUNCE },
    MessageSpec { code: MSG_LEAVE_INDICATION, name: "LeaveIndication", fields: LEAVE_INDICATION },
    MessageSpec { code: MSG_IEEE_ADDRESS_RESPONSE, name: "IeeeAddressResponse", fields: IEEE_ADDRESS_RESPONSE },
];

/// Look up the layout for a message code.
pub fn message_spec(code: u16) -> Option<&'static MessageSpec> {
    MESSAGES.iter().find(|spec| spec.code == code)
}

/// A decoded coordinator message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message code.
    pub code: u16,
    /// Message name.
    pub name: &'static str,
    /// Decoded fields.
    pub payload: Payload,
    /// Link quality of the frame.
    pub lqi: u8,
}

impl Message {
    /// Build a message with a known code, e.g. to script a fake coordinator.
    pub fn new(code: u16, payload: Payload) -> Result<Self, ProtocolError> {
        let spec = message_spec(code).ok_or(ProtocolError::UnknownMessage(code))?;
        Ok(Message {
            code,
            name: spec.name,
            payload,
            lqi: 0xFF,
        })
    }

    /// Decode a message from a validated frame.
    pub fn decode(frame: &Frame) -> Result<Self, ProtocolError> {
        let spec = message_spec(frame.msg_type).ok_or(ProtocolError::UnknownMessage(frame.msg_type))?;
        let Some((&lqi, fields)) = frame.data.split_last() else {
            return Err(ProtocolError::FrameTooShort {
                expected: 1,
                actual: 0,
            });
        };
        let payload = decode_fields(spec.fields, fields)?;
        Ok(Message {
            code: frame.msg_type,
            name: spec.name,
            payload,
            lqi,
        })
    }

    /// Encode as coordinator→host wire bytes, link-quality byte included.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let spec = message_spec(self.code).ok_or(ProtocolError::UnknownMessage(self.code))?;
        let mut data = encode_fields(spec.name, spec.fields, &self.payload)?;
        data.push(self.lqi);
        Frame::check_data_len(&data)?;
        Ok(Frame::encode(self.code, &data))
    }

    /// Numeric field lookup.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.payload.get_u64(name)
    }

    /// The `status` field, when present.
    pub fn status(&self) -> Option<u8> {
        self.get_u64("status").and_then(|s| u8::try_from(s).ok())
    }

    /// Whether this is a status confirmation reporting success.
    pub fn is_success_status(&self) -> bool {
        self.code == MSG_STATUS && self.status() == Some(STATUS_SUCCESS)
    }

    /// Device addresses announced by this message, if it is an announce.
    ///
    /// Covers the dedicated announce message and a ZDO end device announce
    /// carried inside a data indication.
    pub fn announced_device(&self) -> Option<(u16, u64)> {
        match self.code {
            MSG_DEVICE_ANNOUNCE => {
                let short = u16::try_from(self.get_u64("short_address")?).ok()?;
                Some((short, self.get_u64("extended_address")?))
            }
            MSG_DATA_INDICATION
                if self.get_u64("profile_id") == Some(u64::from(ZDO_PROFILE_ID))
                    && self.get_u64("cluster_id")
                        == Some(u64::from(ZDO_END_DEVICE_ANNOUNCE_CLUSTER)) =>
            {
                parse_end_device_announce(self.payload.get("data")?.as_bytes()?)
            }
            _ => None,
        }
    }
}

impl Fields for Message {
    fn field(&self, path: &FieldPath) -> Option<Value> {
        match path {
            FieldPath::Code => Some(Value::U16(self.code)),
            FieldPath::Payload(name) => self.payload.get(name).cloned(),
        }
    }
}

/// Parse a ZDO end device announce: `sequence, nwk (LE), ieee (LE), capability`.
pub fn parse_end_device_announce(data: &[u8]) -> Option<(u16, u64)> {
    if data.len() < 12 {
        return None;
    }
    let short = u16::from_le_bytes([data[1], data[2]]);
    let mut ieee = [0u8; 8];
    ieee.copy_from_slice(&data[3..11]);
    Some((short, u64::from_le_bytes(ieee)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from(message: &Message) -> Frame {
        let wire = message.encode().unwrap();
        Frame::parse(&wire[1..wire.len() - 1]).unwrap()
    }

    #[test]
    fn test_decode_status() {
        let frame = Frame::new(MSG_STATUS, vec![0x00, 0x07, 0x00, 0x10, 0xA0]);
        let message = Message::decode(&frame).unwrap();

        assert_eq!(message.name, "Status");
        assert_eq!(message.lqi, 0xA0);
        assert_eq!(message.get_u64("packet_type"), Some(u64::from(CMD_GET_VERSION)));
        assert!(message.is_success_status());
    }

    #[test]
    fn test_decode_unknown_and_short() {
        let unknown = Message::decode(&Frame::new(0x1234, vec![0x00])).unwrap_err();
        assert_eq!(unknown, ProtocolError::UnknownMessage(0x1234));

        let empty = Message::decode(&Frame::new(MSG_STATUS, vec![])).unwrap_err();
        assert!(matches!(empty, ProtocolError::FrameTooShort { .. }));

        let short = Message::decode(&Frame::new(MSG_STATUS, vec![0x00, 0xFF])).unwrap_err();
        assert!(matches!(short, ProtocolError::FrameTooShort { .. }));
    }

    #[test]
    fn test_data_indication_address_modes() {
        let message = Message::new(
            MSG_DATA_INDICATION,
            Payload::new()
                .with("status", 0u8)
                .with("profile_id", 0x0104u16)
                .with("cluster_id", 0x0006u16)
                .with("source_endpoint", 1u8)
                .with("destination_endpoint", 1u8)
                .with("source_address_mode", ADDRESS_MODE_SHORT)
                .with("source_address", 0x4321u16)
                .with("destination_address_mode", ADDRESS_MODE_IEEE)
                .with("destination_address", 0x00158D0001020304u64)
                .with("data", vec![0x18, 0x01, 0x0A]),
        )
        .unwrap();

        let decoded = Message::decode(&frame_from(&message)).unwrap();
        assert_eq!(decoded.payload.get("source_address"), Some(&Value::U16(0x4321)));
        assert_eq!(
            decoded.payload.get("destination_address"),
            Some(&Value::U64(0x00158D0001020304))
        );
        assert_eq!(decoded.payload.get("data"), Some(&Value::Bytes(vec![0x18, 0x01, 0x0A])));
        assert_eq!(decoded.announced_device(), None);
    }

    #[test]
    fn test_announced_device() {
        let announce = Message::new(
            MSG_DEVICE_ANNOUNCE,
            Payload::new()
                .with("short_address", 0x1234u16)
                .with("extended_address", 0x00124B0001ABCDEFu64)
                .with("mac_capability", 0x8Eu8),
        )
        .unwrap();
        assert_eq!(announce.announced_device(), Some((0x1234, 0x00124B0001ABCDEF)));

        let mut zdo = vec![0x42, 0x34, 0x12];
        zdo.extend_from_slice(&0x00124B0001ABCDEFu64.to_le_bytes());
        zdo.push(0x8E);
        let indication = Message::new(
            MSG_DATA_INDICATION,
            Payload::new()
                .with("profile_id", ZDO_PROFILE_ID)
                .with("cluster_id", ZDO_END_DEVICE_ANNOUNCE_CLUSTER)
                .with("data", zdo),
        )
        .unwrap();
        assert_eq!(indication.announced_device(), Some((0x1234, 0x00124B0001ABCDEF)));
    }
}
