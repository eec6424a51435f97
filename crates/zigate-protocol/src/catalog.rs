//! Command catalog.
//!
//! The catalog knows, for each command code, the parameter layout and what
//! the coordinator sends back: whether a status confirmation follows and
//! which messages count as the command's response.

use std::collections::HashMap;

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::layout::{encode_fields, ParamKind, ParamSpec};
use crate::rules::{Rule, RuleSet};
use crate::value::{FieldPath, Fields, Payload, Value};

/// Catalog entry for one command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Command code.
    pub code: u16,
    /// Command name, for logs and errors.
    pub name: &'static str,
    /// Parameter layout.
    pub params: &'static [ParamSpec],
    /// Alternative response shapes; the first to arrive wins.
    pub response_rules: Vec<RuleSet>,
    /// Whether a status confirmation is sent for this command.
    pub wait_status: bool,
}

impl CommandSpec {
    /// A command confirmed by status only.
    pub fn new(code: u16, name: &'static str, params: &'static [ParamSpec]) -> Self {
        CommandSpec {
            code,
            name,
            params,
            response_rules: Vec::new(),
            wait_status: true,
        }
    }

    /// Add an alternative response shape.
    pub fn response(mut self, rules: Vec<Rule>) -> Self {
        self.response_rules.push(RuleSet::new(rules));
        self
    }

    /// Set whether a status confirmation is expected.
    pub fn wait_status(mut self, wait: bool) -> Self {
        self.wait_status = wait;
        self
    }
}

/// An outbound command instance. Immutable once built.
#[derive(Debug, Clone)]
pub struct Request {
    code: u16,
    name: &'static str,
    payload: Payload,
    data: Vec<u8>,
    response_rules: Vec<RuleSet>,
    wait_status: bool,
}

impl Request {
    /// Command code.
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Command name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Semantic fields.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Declared response shapes.
    pub fn response_rules(&self) -> &[RuleSet] {
        &self.response_rules
    }

    /// Whether a status confirmation must be awaited.
    pub fn wait_status(&self) -> bool {
        self.wait_status
    }

    /// Escaped wire bytes for this request.
    pub fn encode(&self) -> Vec<u8> {
        Frame::encode(self.code, &self.data)
    }
}

impl Fields for Request {
    fn field(&self, path: &FieldPath) -> Option<Value> {
        match path {
            FieldPath::Code => Some(Value::U16(self.code)),
            FieldPath::Payload(name) => self.payload.get(name).cloned(),
        }
    }
}

/// Set of known commands, keyed by code.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    commands: HashMap<u16, CommandSpec>,
}

impl Catalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Catalog::default()
    }

    /// The catalog of ZiGate coordinator commands.
    pub fn zigate() -> Self {
        let mut catalog = Catalog::new();
        for spec in zigate_commands() {
            catalog.register(spec);
        }
        catalog
    }

    /// Add or replace a command.
    pub fn register(&mut self, spec: CommandSpec) {
        self.commands.insert(spec.code, spec);
    }

    /// Look up a command.
    pub fn get(&self, code: u16) -> Option<&CommandSpec> {
        self.commands.get(&code)
    }

    /// Build a request from a code and its payload.
    pub fn build_request(&self, code: u16, payload: Payload) -> Result<Request, ProtocolError> {
        let spec = self.get(code).ok_or(ProtocolError::UnknownCommand(code))?;
        let data = encode_fields(spec.name, spec.params, &payload)?;
        Frame::check_data_len(&data)?;
        Ok(Request {
            code,
            name: spec.name,
            payload,
            data,
            response_rules: spec.response_rules.clone(),
            wait_status: spec.wait_status,
        })
    }
}

// ============================================================================
// ZiGate command table
// ============================================================================

const NO_PARAMS: &[ParamSpec] = &[];

const SET_EXTENDED_PAN_ID: &[ParamSpec] = &[ParamSpec::new("ext_pan_id", ParamKind::U64)];

const SET_CHANNEL_MASK: &[ParamSpec] = &[ParamSpec::new("channel_mask", ParamKind::U32)];

const SET_DEVICE_TYPE: &[ParamSpec] = &[ParamSpec::new("device_type", ParamKind::U8)];

const PERMIT_JOIN: &[ParamSpec] = &[
    ParamSpec::new("target_short_address", ParamKind::U16),
    ParamSpec::new("interval", ParamKind::U8),
    ParamSpec::new("tc_significance", ParamKind::U8),
];

const IEEE_ADDRESS_REQUEST: &[ParamSpec] = &[
    ParamSpec::new("target_short_address", ParamKind::U16),
    ParamSpec::new("short_address", ParamKind::U16),
    ParamSpec::new("request_type", ParamKind::U8),
    ParamSpec::new("start_index", ParamKind::U8),
];

const MANAGEMENT_LEAVE_REQUEST: &[ParamSpec] = &[
    ParamSpec::new("target_short_address", ParamKind::U16),
    ParamSpec::new("extended_address", ParamKind::U64),
    ParamSpec::new("rejoin", ParamKind::U8),
    ParamSpec::new("remove_children", ParamKind::U8),
];

const RAW_APS_DATA_REQUEST: &[ParamSpec] = &[
    ParamSpec::new("address_mode", ParamKind::U8),
    ParamSpec::new("target_address", ParamKind::Address { mode: "address_mode" }),
    ParamSpec::new("source_endpoint", ParamKind::U8),
    ParamSpec::new("destination_endpoint", ParamKind::U8),
    ParamSpec::new("cluster_id", ParamKind::U16),
    ParamSpec::new("profile_id", ParamKind::U16),
    ParamSpec::new("security_mode", ParamKind::U8),
    ParamSpec::new("radius", ParamKind::U8),
    ParamSpec::new("data", ParamKind::LenPrefixedBytes),
];

fn code_is(code: u16) -> Rule {
    Rule::equal(FieldPath::Code, code)
}

fn zigate_commands() -> Vec<CommandSpec> {
    vec![
        CommandSpec::new(CMD_GET_NETWORK_STATE, "GetNetworkState", NO_PARAMS)
            .response(vec![code_is(MSG_NETWORK_STATE)]),
        CommandSpec::new(CMD_GET_VERSION, "GetVersion", NO_PARAMS)
            .response(vec![code_is(MSG_VERSION)]),
        CommandSpec::new(CMD_RESET, "Reset", NO_PARAMS)
            .wait_status(false)
            .response(vec![code_is(MSG_RESTART_NON_FACTORY_NEW)])
            .response(vec![code_is(MSG_RESTART_FACTORY_NEW)]),
        CommandSpec::new(CMD_ERASE_PERSISTENT_DATA, "ErasePersistentData", NO_PARAMS),
        CommandSpec::new(CMD_SET_EXTENDED_PAN_ID, "SetExtendedPanId", SET_EXTENDED_PAN_ID),
        CommandSpec::new(CMD_SET_CHANNEL_MASK, "SetChannelMask", SET_CHANNEL_MASK),
        CommandSpec::new(CMD_SET_DEVICE_TYPE, "SetDeviceType", SET_DEVICE_TYPE),
        CommandSpec::new(CMD_START_NETWORK, "StartNetwork", NO_PARAMS)
            .response(vec![code_is(MSG_NETWORK_JOINED)]),
        CommandSpec::new(CMD_START_NETWORK_SCAN, "StartNetworkScan", NO_PARAMS),
        CommandSpec::new(CMD_PERMIT_JOIN, "PermitJoin", PERMIT_JOIN),
        CommandSpec::new(CMD_IEEE_ADDRESS_REQUEST, "IeeeAddressRequest", IEEE_ADDRESS_REQUEST)
            .response(vec![
                code_is(MSG_IEEE_ADDRESS_RESPONSE),
                Rule::equal_request(
                    FieldPath::Payload("short_address"),
                    FieldPath::Payload("short_address"),
                ),
            ]),
        CommandSpec::new(
            CMD_MANAGEMENT_LEAVE_REQUEST,
            "ManagementLeaveRequest",
            MANAGEMENT_LEAVE_REQUEST,
        )
        .response(vec![
            code_is(MSG_LEAVE_INDICATION),
            Rule::equal_request(
                FieldPath::Payload("extended_address"),
                FieldPath::Payload("extended_address"),
            ),
        ]),
        CommandSpec::new(CMD_RAW_APS_DATA_REQUEST, "RawApsDataRequest", RAW_APS_DATA_REQUEST)
            .response(vec![
                code_is(MSG_DATA_CONFIRM),
                Rule::equal_request(
                    FieldPath::Payload("source_endpoint"),
                    FieldPath::Payload("source_endpoint"),
                ),
                Rule::equal_request(
                    FieldPath::Payload("destination_address"),
                    FieldPath::Payload("target_address"),
                ),
            ])
            .response(vec![
                code_is(MSG_DATA_CONFIRM_FAIL),
                Rule::equal_request(
                    FieldPath::Payload("destination_address"),
                    FieldPath::Payload("target_address"),
                ),
            ])
            .response(vec![
                code_is(MSG_DATA_INDICATION),
                Rule::equal_extra(FieldPath::Payload("cluster_id"), "response_cluster_id"),
                Rule::equal_request(
                    FieldPath::Payload("source_address"),
                    FieldPath::Payload("target_address"),
                ),
            ]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_encodes_params() {
        let catalog = Catalog::zigate();
        let request = catalog
            .build_request(
                CMD_PERMIT_JOIN,
                Payload::new()
                    .with("target_short_address", 0xFFFCu16)
                    .with("interval", 60u8)
                    .with("tc_significance", 0u8),
            )
            .unwrap();

        assert_eq!(request.name(), "PermitJoin");
        assert!(request.wait_status());
        assert!(request.response_rules().is_empty());

        let frame = Frame::parse(&request.encode()[1..request.encode().len() - 1]).unwrap();
        assert_eq!(frame.msg_type, CMD_PERMIT_JOIN);
        assert_eq!(frame.data, vec![0xFF, 0xFC, 60, 0]);
    }

    #[test]
    fn test_build_request_unknown_code() {
        let err = Catalog::zigate().build_request(0x7777, Payload::new()).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownCommand(0x7777));
    }

    #[test]
    fn test_build_request_missing_field() {
        let err = Catalog::zigate()
            .build_request(CMD_SET_CHANNEL_MASK, Payload::new())
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingField {
                command: "SetChannelMask",
                field: "channel_mask"
            }
        );
    }

    fn raw_aps_payload(address_mode: u8, target: Value) -> Payload {
        let mut payload = Payload::new()
            .with("address_mode", address_mode)
            .with("source_endpoint", 1u8)
            .with("destination_endpoint", 1u8)
            .with("cluster_id", 0x0006u16)
            .with("profile_id", 0x0104u16)
            .with("security_mode", 0u8)
            .with("radius", 30u8)
            .with("data", vec![0x01, 0x02]);
        payload.insert("target_address", target);
        payload
    }

    fn frame_data(request: &Request) -> Vec<u8> {
        let wire = request.encode();
        Frame::parse(&wire[1..wire.len() - 1]).unwrap().data
    }

    #[test]
    fn test_raw_aps_target_follows_address_mode() {
        let catalog = Catalog::zigate();

        let short = catalog
            .build_request(
                CMD_RAW_APS_DATA_REQUEST,
                raw_aps_payload(ADDRESS_MODE_SHORT, Value::U16(0x4321)),
            )
            .unwrap();
        assert_eq!(&frame_data(&short)[..3], &[ADDRESS_MODE_SHORT, 0x43, 0x21]);

        let ieee = catalog
            .build_request(
                CMD_RAW_APS_DATA_REQUEST,
                raw_aps_payload(ADDRESS_MODE_IEEE, Value::U64(0x00158D0001020304)),
            )
            .unwrap();
        let data = frame_data(&ieee);
        assert_eq!(
            &data[..9],
            &[ADDRESS_MODE_IEEE, 0x00, 0x15, 0x8D, 0x00, 0x01, 0x02, 0x03, 0x04]
        );
        // endpoints, cluster, profile, security, radius, length, data
        assert_eq!(data.len(), 9 + 2 + 2 + 2 + 1 + 1 + 1 + 2);
        assert_eq!(
            ieee.field(&FieldPath::Payload("target_address")),
            Some(Value::U64(0x00158D0001020304))
        );
    }

    #[test]
    fn test_raw_aps_short_mode_rejects_ieee_sized_target() {
        let err = Catalog::zigate()
            .build_request(
                CMD_RAW_APS_DATA_REQUEST,
                raw_aps_payload(ADDRESS_MODE_SHORT, Value::U64(0x00158D0001020304)),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidField {
                command: "RawApsDataRequest",
                field: "target_address"
            }
        );
    }

    #[test]
    fn test_build_request_rejects_oversized_data() {
        let mut catalog = Catalog::new();
        const BLOB: &[ParamSpec] = &[ParamSpec::new("blob", ParamKind::Bytes)];
        catalog.register(CommandSpec::new(0x0999, "Blob", BLOB));

        let err = catalog
            .build_request(0x0999, Payload::new().with("blob", vec![0u8; MAX_DATA_SIZE + 1]))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong { .. }));
    }

    #[test]
    fn test_reset_declares_two_responses_without_status() {
        let request = Catalog::zigate().build_request(CMD_RESET, Payload::new()).unwrap();
        assert!(!request.wait_status());
        assert_eq!(request.response_rules().len(), 2);
    }

    #[test]
    fn test_request_fields() {
        let request = Catalog::zigate()
            .build_request(CMD_SET_DEVICE_TYPE, Payload::new().with("device_type", 0u8))
            .unwrap();
        assert_eq!(request.field(&FieldPath::Code), Some(Value::U16(CMD_SET_DEVICE_TYPE)));
        assert_eq!(request.field(&FieldPath::Payload("device_type")), Some(Value::U8(0)));
        assert_eq!(request.field(&FieldPath::Payload("missing")), None);
    }
}
