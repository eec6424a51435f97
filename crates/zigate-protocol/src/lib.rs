//! ZiGate Serial Protocol
//!
//! This crate provides types and utilities for talking to a ZiGate Zigbee
//! coordinator over its serial (or TCP-bridged serial) interface. It is the
//! codec and catalog half of the driver; correlating commands with their
//! confirmations lives in `zigate-driver`.
//!
//! # Protocol Overview
//!
//! Every exchange is a frame carrying a 16-bit message type:
//!
//! - **Commands** (host → coordinator): a `CMD_*` code plus parameters
//! - **Status** (coordinator → host): `MSG_STATUS`, accepting or rejecting
//!   the command whose code it echoes in `packet_type`
//! - **Responses and indications** (coordinator → host): every other
//!   `MSG_*` code, either the result of a command or unsolicited
//!
//! # Example
//!
//! ```rust,ignore
//! use zigate_protocol::{Catalog, Frame, FrameCodec, Message, Payload, CMD_GET_VERSION};
//!
//! // Build a command
//! let request = Catalog::zigate().build_request(CMD_GET_VERSION, Payload::new())?;
//! let bytes = request.encode();
//!
//! // Parse a message
//! codec.push(&received);
//! while let Some(body) = codec.decode() {
//!     let message = Message::decode(&Frame::parse(&body)?)?;
//! }
//! ```

mod catalog;
mod constants;
mod error;
mod frame;
mod layout;
mod messages;
mod rules;
mod value;

pub use catalog::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use layout::*;
pub use messages::*;
pub use rules::*;
pub use value::*;
