//! Frame encoding/decoding utilities.
//!
//! ZiGate frames are delimited by start and end markers. Every byte of the
//! body below `0x10` is escaped so the markers never appear inside a frame.
//!
//! ```text
//! +------+----------+--------+----------+---------------+------+
//! | 0x01 | msg_type | length | checksum | data[0..len]  | 0x03 |
//! |      | u16 BE   | u16 BE | u8 (XOR) |               |      |
//! +------+----------+--------+----------+---------------+------+
//! ```
//!
//! [`FrameCodec`] only delimits the byte stream; [`Frame::parse`] unescapes a
//! delimited body and validates the header.

use bytes::{Buf, BufMut, BytesMut};

use crate::constants::*;
use crate::error::ProtocolError;

/// A codec that splits a byte stream into escaped frame bodies.
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec.
    pub fn new() -> Self {
        FrameCodec {
            buffer: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next delimited frame body from the buffer.
    ///
    /// Returns the bytes between the start and end markers, still escaped,
    /// or `None` if more data is needed.
    pub fn decode(&mut self) -> Option<Vec<u8>> {
        // Scan for the start marker, discarding any preceding garbage
        let start = self.buffer.iter().position(|&b| b == FRAME_START);
        match start {
            Some(0) => {}
            Some(n) => {
                log::trace!("discarding {} bytes before start marker", n);
                self.buffer.advance(n);
            }
            None => {
                self.buffer.clear();
                return None;
            }
        }

        let Some(end) = self.buffer.iter().position(|&b| b == FRAME_END) else {
            // Every body byte may be doubled by escaping
            if self.buffer.len() > 2 * MAX_FRAME_SIZE + 2 {
                log::warn!(
                    "dropping {} buffered bytes without an end marker",
                    self.buffer.len()
                );
                self.buffer.clear();
            }
            return None;
        };

        let frame = self.buffer.split_to(end + 1);
        Some(frame[1..end].to_vec())
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// A validated, unescaped frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Command or message code.
    pub msg_type: u16,
    /// Frame data (everything after the header).
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a frame from a message type and its data.
    pub fn new(msg_type: u16, data: Vec<u8>) -> Self {
        Frame { msg_type, data }
    }

    /// Parse an escaped frame body as returned by [`FrameCodec::decode`].
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let raw = unescape(body)?;
        if raw.len() < FRAME_HEADER_SIZE {
            return Err(ProtocolError::FrameTooShort {
                expected: FRAME_HEADER_SIZE,
                actual: raw.len(),
            });
        }

        let msg_type = u16::from_be_bytes([raw[0], raw[1]]);
        let declared = u16::from_be_bytes([raw[2], raw[3]]) as usize;
        let carried = raw[4];
        let data = raw[FRAME_HEADER_SIZE..].to_vec();

        if data.len() != declared {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: data.len(),
            });
        }

        let expected = checksum(msg_type, &data);
        if expected != carried {
            return Err(ProtocolError::BadChecksum {
                expected,
                actual: carried,
            });
        }

        Ok(Frame { msg_type, data })
    }

    /// Encode this frame into escaped wire bytes, markers included.
    pub fn to_bytes(&self) -> Vec<u8> {
        Frame::encode(self.msg_type, &self.data)
    }

    /// Check that `data` fits in a single frame.
    pub fn check_data_len(data: &[u8]) -> Result<(), ProtocolError> {
        if data.len() > MAX_DATA_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_DATA_SIZE,
                actual: data.len(),
            });
        }
        Ok(())
    }

    /// Encode a message type and data into escaped wire bytes.
    ///
    /// `data` must be at most [`MAX_DATA_SIZE`] bytes; callers building frames
    /// from untrusted input check it with [`Frame::check_data_len`] first, as
    /// request and message encoding do.
    pub fn encode(msg_type: u16, data: &[u8]) -> Vec<u8> {
        debug_assert!(data.len() <= MAX_DATA_SIZE, "frame data too long");
        let mut raw = Vec::with_capacity(FRAME_HEADER_SIZE + data.len());
        raw.put_u16(msg_type);
        raw.put_u16(data.len() as u16);
        raw.put_u8(checksum(msg_type, data));
        raw.extend_from_slice(data);

        let mut wire = Vec::with_capacity(raw.len() * 2 + 2);
        wire.push(FRAME_START);
        for byte in raw {
            if byte < ESCAPE_MASK {
                wire.push(FRAME_ESCAPE);
                wire.push(byte ^ ESCAPE_MASK);
            } else {
                wire.push(byte);
            }
        }
        wire.push(FRAME_END);
        wire
    }
}

/// XOR checksum over the message type, the length and the data.
pub fn checksum(msg_type: u16, data: &[u8]) -> u8 {
    let [t0, t1] = msg_type.to_be_bytes();
    let [l0, l1] = (data.len() as u16).to_be_bytes();
    data.iter().fold(t0 ^ t1 ^ l0 ^ l1, |acc, b| acc ^ b)
}

fn unescape(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.iter();
    while let Some(&byte) = bytes.next() {
        if byte == FRAME_ESCAPE {
            let next = bytes.next().ok_or(ProtocolError::DanglingEscape)?;
            out.push(next ^ ESCAPE_MASK);
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_escapes_low_bytes() {
        let encoded = Frame::encode(0x0010, &[]);
        // 0x00 0x10 | 0x00 0x00 | checksum 0x10
        assert_eq!(
            encoded,
            vec![0x01, 0x02, 0x10, 0x10, 0x02, 0x10, 0x02, 0x10, 0x10, 0x03]
        );
        assert!(!encoded[1..encoded.len() - 1].contains(&FRAME_END));
    }

    #[test]
    fn test_codec_decode_and_parse() {
        let mut codec = FrameCodec::new();
        codec.push(&Frame::encode(0x8010, &[0x00, 0x01, 0x03, 0x1D]));

        let body = codec.decode().expect("should decode frame");
        let frame = Frame::parse(&body).expect("should parse frame");
        assert_eq!(frame.msg_type, 0x8010);
        assert_eq!(frame.data, vec![0x00, 0x01, 0x03, 0x1D]);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_codec_partial() {
        let mut codec = FrameCodec::new();
        let encoded = Frame::encode(0x8000, &[0x00, 0x01, 0x00, 0x10]);

        codec.push(&encoded[..4]);
        assert!(codec.decode().is_none());

        codec.push(&encoded[4..]);
        let body = codec.decode().expect("should decode frame");
        assert_eq!(Frame::parse(&body).unwrap().msg_type, 0x8000);
    }

    #[test]
    fn test_codec_multiple_with_garbage() {
        let mut codec = FrameCodec::new();
        let mut stream = vec![0xAA, 0xBB];
        stream.extend(Frame::encode(0x8000, &[0x00]));
        stream.extend(Frame::encode(0x8010, &[0x12, 0x34]));
        codec.push(&stream);

        let first = Frame::parse(&codec.decode().unwrap()).unwrap();
        let second = Frame::parse(&codec.decode().unwrap()).unwrap();
        assert_eq!(first.msg_type, 0x8000);
        assert_eq!(second.msg_type, 0x8010);
        assert!(codec.decode().is_none());
    }

    #[test]
    fn test_codec_drops_oversize_partial() {
        let mut codec = FrameCodec::new();
        codec.push(&[FRAME_START]);
        codec.push(&vec![0x55; 2 * MAX_FRAME_SIZE + 8]);
        assert!(codec.decode().is_none());
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_parse_bad_checksum() {
        let mut encoded = Frame::encode(0x8010, &[0x20, 0x30]);
        // Corrupt the last data byte (unescaped, >= 0x10)
        let last = encoded.len() - 2;
        encoded[last] = 0x31;
        let err = Frame::parse(&encoded[1..encoded.len() - 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::BadChecksum { .. }));
    }

    #[test]
    fn test_parse_length_mismatch() {
        let mut encoded = Frame::encode(0x8010, &[0x20, 0x30]);
        encoded.insert(encoded.len() - 1, 0x40);
        let err = Frame::parse(&encoded[1..encoded.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::LengthMismatch {
                declared: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn test_check_data_len() {
        assert!(Frame::check_data_len(&vec![0u8; MAX_DATA_SIZE]).is_ok());
        assert_eq!(
            Frame::check_data_len(&vec![0u8; MAX_DATA_SIZE + 1]),
            Err(ProtocolError::FrameTooLong {
                max: MAX_DATA_SIZE,
                actual: MAX_DATA_SIZE + 1
            })
        );
        // The largest frame still round-trips through the decoder
        let data = vec![0x42u8; MAX_DATA_SIZE];
        let mut codec = FrameCodec::new();
        codec.push(&Frame::encode(0x8002, &data));
        let frame = Frame::parse(&codec.decode().unwrap()).unwrap();
        assert_eq!(frame.data, data);
    }

    #[test]
    fn test_parse_too_short() {
        let err = Frame::parse(&[0x80, 0x00]).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooShort { .. }));
    }

    #[test]
    fn test_parse_dangling_escape() {
        let err = Frame::parse(&[0x80, 0x02]).unwrap_err();
        assert_eq!(err, ProtocolError::DanglingEscape);
    }
}
