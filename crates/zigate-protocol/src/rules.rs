//! Response matching rules.
//!
//! A rule compares one field of a received message against an expected
//! value. The expected value is either a literal, a field of the request
//! that is waiting, or a caller-supplied extra parameter. Rules are plain
//! data here; they are evaluated by the driver.

use std::fmt;

use crate::value::{FieldPath, Value};

/// How a received value is compared with the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Values are equal (numeric values compare across widths).
    Equal,
    /// Values are both present and not equal.
    NotEqual,
    /// Every bit set in the expected value is set in the received value.
    BitsSet,
}

impl Comparator {
    /// Apply the comparator. Mismatched kinds never match.
    pub fn compare(&self, received: &Value, expected: &Value) -> bool {
        match self {
            Comparator::Equal => equal(received, expected).unwrap_or(false),
            Comparator::NotEqual => equal(received, expected).map(|eq| !eq).unwrap_or(false),
            Comparator::BitsSet => match (received.as_u64(), expected.as_u64()) {
                (Some(r), Some(e)) => r & e == e,
                _ => false,
            },
        }
    }
}

/// `None` when the two values cannot be compared.
fn equal(received: &Value, expected: &Value) -> Option<bool> {
    match (received.as_u64(), expected.as_u64()) {
        (Some(r), Some(e)) => Some(r == e),
        (None, None) => Some(received.as_bytes()? == expected.as_bytes()?),
        _ => None,
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Equal => write!(f, "=="),
            Comparator::NotEqual => write!(f, "!="),
            Comparator::BitsSet => write!(f, "&="),
        }
    }
}

/// Where the expected value of a rule comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    /// A fixed value.
    Literal(Value),
    /// A field of the request that registered the expectation.
    Request(FieldPath),
    /// A named caller-supplied extra parameter.
    Extra(&'static str),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Literal(value) => write!(f, "{}", value),
            Expected::Request(path) => write!(f, "request.{}", path),
            Expected::Extra(name) => write!(f, "extra.{}", name),
        }
    }
}

/// A single matching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Field of the received message.
    pub received: FieldPath,
    /// Expected value source.
    pub expected: Expected,
    /// Comparison to apply.
    pub comparator: Comparator,
}

impl Rule {
    /// `received == literal`.
    pub fn equal(received: FieldPath, value: impl Into<Value>) -> Self {
        Rule {
            received,
            expected: Expected::Literal(value.into()),
            comparator: Comparator::Equal,
        }
    }

    /// `received == request.<path>`.
    pub fn equal_request(received: FieldPath, path: FieldPath) -> Self {
        Rule {
            received,
            expected: Expected::Request(path),
            comparator: Comparator::Equal,
        }
    }

    /// `received == extra.<name>`.
    pub fn equal_extra(received: FieldPath, name: &'static str) -> Self {
        Rule {
            received,
            expected: Expected::Extra(name),
            comparator: Comparator::Equal,
        }
    }

    /// Replace the comparator.
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.received, self.comparator, self.expected)
    }
}

/// Rules that must all pass for a message to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet(pub Vec<Rule>);

impl RuleSet {
    /// Create a rule set.
    pub fn new(rules: Vec<Rule>) -> Self {
        RuleSet(rules)
    }

    /// The rules in declaration order.
    pub fn rules(&self) -> &[Rule] {
        &self.0
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, rule) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " && ")?;
            }
            write!(f, "{}", rule)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_across_widths() {
        assert!(Comparator::Equal.compare(&Value::U8(0x10), &Value::U16(0x0010)));
        assert!(!Comparator::Equal.compare(&Value::U8(0x10), &Value::U8(0x11)));
        assert!(Comparator::Equal.compare(&Value::Bytes(vec![1, 2]), &Value::Bytes(vec![1, 2])));
    }

    #[test]
    fn test_mismatched_kinds_never_match() {
        assert!(!Comparator::Equal.compare(&Value::U8(1), &Value::Bytes(vec![1])));
        assert!(!Comparator::NotEqual.compare(&Value::U8(1), &Value::Bytes(vec![1])));
        assert!(!Comparator::BitsSet.compare(&Value::Bytes(vec![1]), &Value::U8(1)));
    }

    #[test]
    fn test_not_equal_and_bits_set() {
        assert!(Comparator::NotEqual.compare(&Value::U8(1), &Value::U8(2)));
        assert!(Comparator::BitsSet.compare(&Value::U8(0b1011), &Value::U8(0b0011)));
        assert!(!Comparator::BitsSet.compare(&Value::U8(0b1001), &Value::U8(0b0011)));
    }

    #[test]
    fn test_display() {
        let set = RuleSet::new(vec![
            Rule::equal(FieldPath::Code, 0x8000u16),
            Rule::equal_request(FieldPath::Payload("packet_type"), FieldPath::Code),
        ]);
        assert_eq!(
            set.to_string(),
            "[code == 0x8000 && payload.packet_type == request.code]"
        );
    }
}
