//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when working with the ZiGate protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame is too short to be valid.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Declared payload length does not match the frame body.
    #[error("length mismatch: header declares {declared} bytes, frame carries {actual}")]
    LengthMismatch {
        /// Length from the frame header.
        declared: usize,
        /// Length actually present.
        actual: usize,
    },

    /// Checksum did not match the frame contents.
    #[error("bad checksum: expected 0x{expected:02X}, got 0x{actual:02X}")]
    BadChecksum {
        /// Checksum computed over the frame.
        expected: u8,
        /// Checksum carried in the header.
        actual: u8,
    },

    /// Frame data does not fit in one frame.
    #[error("frame too long: at most {max} data bytes, got {actual}")]
    FrameTooLong {
        /// Largest data length a frame can carry.
        max: usize,
        /// Data length that was supplied.
        actual: usize,
    },

    /// Escape marker at the end of a frame.
    #[error("dangling escape byte at end of frame")]
    DanglingEscape,

    /// Command code not present in the catalog.
    #[error("unknown command code: 0x{0:04X}")]
    UnknownCommand(u16),

    /// Message code the decoder has no layout for.
    #[error("unknown message code: 0x{0:04X}")]
    UnknownMessage(u16),

    /// A required request field was not supplied.
    #[error("missing field `{field}` for {command}")]
    MissingField {
        /// Command name.
        command: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// A request field does not fit its wire representation.
    #[error("invalid value for field `{field}` of {command}")]
    InvalidField {
        /// Command name.
        command: &'static str,
        /// Field name.
        field: &'static str,
    },
}
