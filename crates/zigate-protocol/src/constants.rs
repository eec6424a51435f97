//! Protocol constants
//!
//! These constants define the command codes, message codes, and other
//! protocol-specific values used by the ZiGate serial protocol.

// ============================================================================
// Framing
// ============================================================================

/// Start-of-frame marker.
pub const FRAME_START: u8 = 0x01;
/// Escape marker; the following byte is XORed with [`ESCAPE_MASK`].
pub const FRAME_ESCAPE: u8 = 0x02;
/// End-of-frame marker.
pub const FRAME_END: u8 = 0x03;
/// Mask applied to escaped bytes.
pub const ESCAPE_MASK: u8 = 0x10;

// ============================================================================
// Command Codes (host → coordinator)
// ============================================================================

/// Query the current network state.
pub const CMD_GET_NETWORK_STATE: u16 = 0x0009;
/// Query the firmware version.
pub const CMD_GET_VERSION: u16 = 0x0010;
/// Soft reset of the coordinator.
pub const CMD_RESET: u16 = 0x0011;
/// Erase persistent data (network settings, device tables).
pub const CMD_ERASE_PERSISTENT_DATA: u16 = 0x0012;
/// Set the extended PAN ID used when forming a network.
pub const CMD_SET_EXTENDED_PAN_ID: u16 = 0x0020;
/// Set the channel mask used when forming a network.
pub const CMD_SET_CHANNEL_MASK: u16 = 0x0021;
/// Set the device type (coordinator, router, legacy router).
pub const CMD_SET_DEVICE_TYPE: u16 = 0x0023;
/// Form or join a network.
pub const CMD_START_NETWORK: u16 = 0x0024;
/// Start a network scan.
pub const CMD_START_NETWORK_SCAN: u16 = 0x0025;
/// ZDO IEEE address request.
pub const CMD_IEEE_ADDRESS_REQUEST: u16 = 0x0041;
/// ZDO management leave request.
pub const CMD_MANAGEMENT_LEAVE_REQUEST: u16 = 0x0047;
/// Permit devices to join for a number of seconds.
pub const CMD_PERMIT_JOIN: u16 = 0x0049;
/// Send a raw APS data frame.
pub const CMD_RAW_APS_DATA_REQUEST: u16 = 0x0530;

// ============================================================================
// Message Codes (coordinator → host)
// ============================================================================

/// Device announce (a device joined or rejoined).
pub const MSG_DEVICE_ANNOUNCE: u16 = 0x004D;
/// Status confirmation for a previously issued command.
pub const MSG_STATUS: u16 = 0x8000;
/// APS data indication.
pub const MSG_DATA_INDICATION: u16 = 0x8002;
/// Coordinator restarted, not factory new.
pub const MSG_RESTART_NON_FACTORY_NEW: u16 = 0x8006;
/// Coordinator restarted, factory new.
pub const MSG_RESTART_FACTORY_NEW: u16 = 0x8007;
/// Network state response.
pub const MSG_NETWORK_STATE: u16 = 0x8009;
/// Firmware version response.
pub const MSG_VERSION: u16 = 0x8010;
/// APS data confirm.
pub const MSG_DATA_CONFIRM: u16 = 0x8012;
/// Permit join status.
pub const MSG_PERMIT_JOIN_STATUS: u16 = 0x8014;
/// Network joined or formed.
pub const MSG_NETWORK_JOINED: u16 = 0x8024;
/// ZDO IEEE address response.
pub const MSG_IEEE_ADDRESS_RESPONSE: u16 = 0x8041;
/// Leave indication.
pub const MSG_LEAVE_INDICATION: u16 = 0x8048;
/// APS data confirm failure.
pub const MSG_DATA_CONFIRM_FAIL: u16 = 0x8702;

// ============================================================================
// Status Codes (in MSG_STATUS)
// ============================================================================

/// Command accepted.
pub const STATUS_SUCCESS: u8 = 0x00;
/// Incorrect parameters.
pub const STATUS_INCORRECT_PARAMETERS: u8 = 0x01;
/// Unhandled command.
pub const STATUS_UNHANDLED_COMMAND: u8 = 0x02;
/// Command failed.
pub const STATUS_COMMAND_FAILED: u8 = 0x03;
/// Coordinator busy.
pub const STATUS_BUSY: u8 = 0x04;
/// Stack already started.
pub const STATUS_STACK_ALREADY_STARTED: u8 = 0x05;

// ============================================================================
// Addressing
// ============================================================================

/// Group address mode (16-bit group id).
pub const ADDRESS_MODE_GROUP: u8 = 0x01;
/// Short (16-bit network) address mode.
pub const ADDRESS_MODE_SHORT: u8 = 0x02;
/// IEEE (64-bit extended) address mode.
pub const ADDRESS_MODE_IEEE: u8 = 0x03;

/// ZDO profile identifier.
pub const ZDO_PROFILE_ID: u16 = 0x0000;
/// ZDO end device announce cluster.
pub const ZDO_END_DEVICE_ANNOUNCE_CLUSTER: u16 = 0x0013;

// ============================================================================
// Limits
// ============================================================================

/// Size of the frame header (msg_type, length, checksum).
pub const FRAME_HEADER_SIZE: usize = 5;
/// Maximum unescaped frame body accepted by the decoder.
pub const MAX_FRAME_SIZE: usize = 512;
/// Maximum data carried by one frame.
pub const MAX_DATA_SIZE: usize = MAX_FRAME_SIZE - FRAME_HEADER_SIZE;
