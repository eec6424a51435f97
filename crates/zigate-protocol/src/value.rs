//! Field values, payloads and field paths.
//!
//! Requests, decoded messages and caller-supplied extra parameters all expose
//! their fields through the [`Fields`] trait so that matching rules can look
//! values up by [`FieldPath`] without knowing the concrete object kind.

use std::collections::BTreeMap;
use std::fmt;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// 8-bit unsigned integer.
    U8(u8),
    /// 16-bit unsigned integer.
    U16(u16),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Numeric view of the value, independent of its width.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(u64::from(*v)),
            Value::U16(v) => Some(u64::from(*v)),
            Value::U32(v) => Some(u64::from(*v)),
            Value::U64(v) => Some(*v),
            Value::Bytes(_) => None,
        }
    }

    /// Byte view of the value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U8(v) => write!(f, "0x{:02X}", v),
            Value::U16(v) => write!(f, "0x{:04X}", v),
            Value::U32(v) => write!(f, "0x{:08X}", v),
            Value::U64(v) => write!(f, "0x{:016X}", v),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::U16(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::U32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::U64(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

/// Named fields of a request, a decoded message, or extra parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(BTreeMap<&'static str, Value>);

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Payload(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.0.insert(name, value.into());
        self
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, name: &'static str, value: impl Into<Value>) {
        self.0.insert(name, value.into());
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Numeric lookup.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

/// Location of a field on a request, message, or extra-parameter bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPath {
    /// The command or message code.
    Code,
    /// A named payload field.
    Payload(&'static str),
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::Code => write!(f, "code"),
            FieldPath::Payload(name) => write!(f, "payload.{}", name),
        }
    }
}

/// Field lookup by path. A path that does not resolve yields `None`.
pub trait Fields {
    /// Resolve a field path.
    fn field(&self, path: &FieldPath) -> Option<Value>;
}

impl Fields for Payload {
    fn field(&self, path: &FieldPath) -> Option<Value> {
        match path {
            FieldPath::Code => None,
            FieldPath::Payload(name) => self.get(name).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_view_ignores_width() {
        assert_eq!(Value::U8(7).as_u64(), Value::U64(7).as_u64());
        assert_eq!(Value::Bytes(vec![7]).as_u64(), None);
    }

    #[test]
    fn test_payload_builder_and_lookup() {
        let payload = Payload::new().with("channel", 11u8).with("mask", 0x0800u32);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("channel"), Some(&Value::U8(11)));
        assert_eq!(payload.get_u64("mask"), Some(0x0800));
        assert_eq!(payload.get("missing"), None);
    }

    #[test]
    fn test_payload_fields_resolution_is_stable() {
        let payload = Payload::new().with("short_address", 0x1234u16);
        let path = FieldPath::Payload("short_address");
        assert_eq!(payload.field(&path), payload.field(&path));
        assert_eq!(payload.field(&FieldPath::Code), None);
        assert_eq!(payload.field(&FieldPath::Payload("nope")), None);
    }

    #[test]
    fn test_display() {
        let payload = Payload::new().with("a", 1u8).with("b", vec![0xde, 0xad]);
        assert_eq!(payload.to_string(), "{a: 0x01, b: dead}");
        assert_eq!(FieldPath::Payload("status").to_string(), "payload.status");
    }
}
