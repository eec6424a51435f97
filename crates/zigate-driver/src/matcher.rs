//! Rule evaluation for coordinator messages.
//!
//! A [`Matcher`] ties a rule set to the request that registered it and to
//! any extra parameters the caller supplied, so rules can compare a received
//! field against a literal, a request field, or an extra parameter.

use std::sync::Arc;
use std::time::Duration;

use zigate_protocol::{
    Expected, FieldPath, Fields, Message, Payload, Request, Rule, RuleSet, MSG_STATUS,
};

use crate::waiter::WaitPolicy;

/// Rules for one expectation, plus what they may refer back to.
#[derive(Debug, Clone)]
pub struct Matcher {
    /// Request that registered the expectation.
    pub request: Arc<Request>,
    /// Rules that must all pass.
    pub rules: RuleSet,
    /// Caller-supplied extra parameters.
    pub extra: Option<Arc<Payload>>,
}

impl Matcher {
    /// Create a matcher.
    pub fn new(request: Arc<Request>, rules: RuleSet, extra: Option<Arc<Payload>>) -> Self {
        Matcher {
            request,
            rules,
            extra,
        }
    }

    /// Matches the status confirmation for `request`.
    pub fn status(request: Arc<Request>) -> Self {
        let rules = RuleSet::new(vec![
            Rule::equal(FieldPath::Code, MSG_STATUS),
            Rule::equal_request(FieldPath::Payload("packet_type"), FieldPath::Code),
        ]);
        Matcher::new(request, rules, None)
    }

    /// Whether every rule passes for `received`.
    pub fn matches(&self, received: &Message) -> bool {
        self.rules
            .rules()
            .iter()
            .all(|rule| self.rule_passes(rule, received))
    }

    /// A rule with an unresolvable side never passes.
    fn rule_passes(&self, rule: &Rule, received: &Message) -> bool {
        let expected = match &rule.expected {
            Expected::Literal(value) => Some(value.clone()),
            Expected::Request(path) => self.request.field(path),
            Expected::Extra(name) => self
                .extra
                .as_deref()
                .and_then(|extra| extra.field(&FieldPath::Payload(*name))),
        };

        match (received.field(&rule.received), expected) {
            (Some(received), Some(expected)) => rule.comparator.compare(&received, &expected),
            _ => false,
        }
    }
}

/// Waiter policy for coordinator messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessagePolicy;

impl WaitPolicy for MessagePolicy {
    type Matcher = Matcher;
    type Item = Message;

    fn matches(&self, item: &Message, matcher: &Matcher) -> bool {
        matcher.matches(item)
    }

    fn describe(&self, matcher: &Matcher, timeout: Duration) -> String {
        format!(
            "timed out after {}ms waiting for {} (0x{:04X}) to receive {}",
            timeout.as_millis(),
            matcher.request.name(),
            matcher.request.code(),
            matcher.rules
        )
    }
}
