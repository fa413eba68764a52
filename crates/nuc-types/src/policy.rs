//! The policy language attached to delegations.
//!
//! A policy is a boolean expression over [`Selector`]s, written on the wire
//! as S-expression-shaped JSON arrays:
//!
//! ```json
//! ["and", [
//!   ["==", ".args.collection", "orders"],
//!   ["anyOf", "$.req.role", ["admin", "writer"]]
//! ]]
//! ```
//!
//! Operators are `==`, `!=`, and `anyOf`; connectors are `and`, `or`, and
//! `not`. A delegation carries a [`Policies`] list whose rules are combined
//! by implicit `and`. Evaluation never fails: selectors resolve to
//! "undefined" on missing paths, and an undefined value equals nothing.
//!
//! Comparison is structural deep equality with JSON semantics: numbers
//! compare by value (`1 == 1.0`), objects by key set and recursive
//! equality, arrays positionally.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::{Value, json};

use crate::selector::{Selector, SelectorParseError};

/// A single policy rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Policy {
    /// `["==", selector, value]` — the resolved value deep-equals `value`.
    Eq(Selector, Value),
    /// `["!=", selector, value]` — the resolved value differs from `value`.
    Ne(Selector, Value),
    /// `["anyOf", selector, [value, …]]` — the resolved value deep-equals
    /// one of the options.
    AnyOf(Selector, Vec<Value>),
    /// `["and", [policy, …]]` — all hold, short-circuiting.
    And(Vec<Policy>),
    /// `["or", [policy, …]]` — at least one holds, short-circuiting.
    Or(Vec<Policy>),
    /// `["not", policy]` — the inner policy does not hold.
    Not(Box<Policy>),
}

/// Shape measurements of a policy tree, checked against validator limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PolicyTreeProperties {
    /// Longest operator/connector nesting, 1 for a bare operator.
    pub max_depth: usize,
    /// Widest connector fan-out anywhere in the tree.
    pub max_width: usize,
}

impl Policy {
    /// Evaluates this policy against a token payload and external context.
    pub fn evaluate(&self, token: &Value, context: &Value) -> bool {
        match self {
            Policy::Eq(selector, expected) => selector
                .apply(token, context)
                .is_some_and(|value| json_eq(value, expected)),
            Policy::Ne(selector, expected) => !selector
                .apply(token, context)
                .is_some_and(|value| json_eq(value, expected)),
            Policy::AnyOf(selector, options) => selector
                .apply(token, context)
                .is_some_and(|value| options.iter().any(|option| json_eq(value, option))),
            Policy::And(policies) => policies
                .iter()
                .all(|policy| policy.evaluate(token, context)),
            Policy::Or(policies) => policies
                .iter()
                .any(|policy| policy.evaluate(token, context)),
            Policy::Not(policy) => !policy.evaluate(token, context),
        }
    }

    /// Measures the depth and width of this policy tree.
    pub fn properties(&self) -> PolicyTreeProperties {
        match self {
            Policy::Eq(..) | Policy::Ne(..) | Policy::AnyOf(..) => PolicyTreeProperties {
                max_depth: 1,
                max_width: 0,
            },
            Policy::Not(policy) => {
                let inner = policy.properties();
                PolicyTreeProperties {
                    max_depth: 1 + inner.max_depth,
                    max_width: inner.max_width.max(1),
                }
            }
            Policy::And(policies) | Policy::Or(policies) => {
                let mut properties = PolicyTreeProperties {
                    max_depth: 0,
                    max_width: policies.len(),
                };
                for policy in policies {
                    let inner = policy.properties();
                    properties.max_depth = properties.max_depth.max(inner.max_depth);
                    properties.max_width = properties.max_width.max(inner.max_width);
                }
                properties.max_depth += 1;
                properties
            }
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Policy::Eq(selector, value) => json!(["==", selector, value]),
            Policy::Ne(selector, value) => json!(["!=", selector, value]),
            Policy::AnyOf(selector, options) => json!(["anyOf", selector, options]),
            Policy::And(policies) => {
                json!(["and", policies.iter().map(Policy::to_value).collect::<Vec<_>>()])
            }
            Policy::Or(policies) => {
                json!(["or", policies.iter().map(Policy::to_value).collect::<Vec<_>>()])
            }
            Policy::Not(policy) => json!(["not", policy.to_value()]),
        }
    }
}

/// Structural deep equality with JSON semantics.
///
/// Numbers compare by value regardless of their serde representation, so
/// `1`, `1.0`, and `1u64` are all equal.
fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => {
            if let (Some(left), Some(right)) = (left.as_i64(), right.as_i64()) {
                left == right
            } else if let (Some(left), Some(right)) = (left.as_u64(), right.as_u64()) {
                left == right
            } else {
                match (left.as_f64(), right.as_f64()) {
                    (Some(left), Some(right)) => left == right,
                    _ => false,
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => {
            left.len() == right.len()
                && left.iter().zip(right).all(|(l, r)| json_eq(l, r))
        }
        (Value::Object(left), Value::Object(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .all(|(key, l)| right.get(key).is_some_and(|r| json_eq(l, r)))
        }
        _ => left == right,
    }
}

/// Error returned when parsing a malformed policy rule.
#[derive(Debug, thiserror::Error)]
pub enum PolicyParseError {
    /// A rule is not a JSON array.
    #[error("policy rule must be a JSON array")]
    NotAnArray,
    /// A rule array is empty or its operator is not a string.
    #[error("policy rule is missing its operator")]
    MissingOperator,
    /// The operator is not one of the known operators/connectors.
    #[error("unknown policy operator '{0}'")]
    UnknownOperator(String),
    /// A rule has the wrong number or shape of operands.
    #[error("malformed '{0}' rule")]
    MalformedRule(&'static str),
    /// An explicit `and`/`or` has an empty operand list.
    #[error("'{0}' requires at least one policy")]
    EmptyConnector(&'static str),
    /// A rule's selector failed to parse.
    #[error(transparent)]
    Selector(#[from] SelectorParseError),
}

impl TryFrom<&Value> for Policy {
    type Error = PolicyParseError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let rule = value.as_array().ok_or(PolicyParseError::NotAnArray)?;
        let operator = rule
            .first()
            .and_then(Value::as_str)
            .ok_or(PolicyParseError::MissingOperator)?;
        match operator {
            "==" | "!=" => {
                let [_, selector, operand] = rule.as_slice() else {
                    return Err(PolicyParseError::MalformedRule("comparison"));
                };
                let selector = parse_selector(selector, "comparison")?;
                if operator == "==" {
                    Ok(Policy::Eq(selector, operand.clone()))
                } else {
                    Ok(Policy::Ne(selector, operand.clone()))
                }
            }
            "anyOf" => {
                let [_, selector, options] = rule.as_slice() else {
                    return Err(PolicyParseError::MalformedRule("anyOf"));
                };
                let selector = parse_selector(selector, "anyOf")?;
                let options = options
                    .as_array()
                    .ok_or(PolicyParseError::MalformedRule("anyOf"))?;
                Ok(Policy::AnyOf(selector, options.clone()))
            }
            "and" | "or" => {
                let [_, operands] = rule.as_slice() else {
                    return Err(PolicyParseError::MalformedRule("connector"));
                };
                let operands = operands
                    .as_array()
                    .ok_or(PolicyParseError::MalformedRule("connector"))?;
                if operands.is_empty() {
                    let name = if operator == "and" { "and" } else { "or" };
                    return Err(PolicyParseError::EmptyConnector(name));
                }
                let policies = operands
                    .iter()
                    .map(Policy::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                if operator == "and" {
                    Ok(Policy::And(policies))
                } else {
                    Ok(Policy::Or(policies))
                }
            }
            "not" => {
                let [_, operand] = rule.as_slice() else {
                    return Err(PolicyParseError::MalformedRule("not"));
                };
                Ok(Policy::Not(Box::new(Policy::try_from(operand)?)))
            }
            other => Err(PolicyParseError::UnknownOperator(other.into())),
        }
    }
}

fn parse_selector(value: &Value, rule: &'static str) -> Result<Selector, PolicyParseError> {
    let s = value
        .as_str()
        .ok_or(PolicyParseError::MalformedRule(rule))?;
    Ok(s.parse()?)
}

impl Serialize for Policy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Policy::try_from(&value).map_err(de::Error::custom)
    }
}

/// The ordered rule list attached to a delegation, combined by implicit
/// `and`. An empty list is trivially true.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policies(pub Vec<Policy>);

impl Policies {
    /// Creates a policy list from its rules.
    pub fn new<I: IntoIterator<Item = Policy>>(policies: I) -> Self {
        Self(policies.into_iter().collect())
    }

    /// An empty, trivially-true policy list.
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// Evaluates every rule against the token payload and context.
    pub fn evaluate(&self, token: &Value, context: &Value) -> bool {
        self.0.iter().all(|policy| policy.evaluate(token, context))
    }

    /// Measures the whole list: the implicit `and` counts its length as a
    /// connector width but does not add a nesting level.
    pub fn properties(&self) -> PolicyTreeProperties {
        let mut properties = PolicyTreeProperties {
            max_depth: 0,
            max_width: self.0.len(),
        };
        for policy in &self.0 {
            let inner = policy.properties();
            properties.max_depth = properties.max_depth.max(inner.max_depth);
            properties.max_width = properties.max_width.max(inner.max_width);
        }
        properties
    }

    /// The number of top-level rules.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list has no rules.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Policy>> for Policies {
    fn from(policies: Vec<Policy>) -> Self {
        Self(policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(value: Value) -> Policy {
        Policy::try_from(&value).unwrap()
    }

    fn parse_error(value: Value) -> PolicyParseError {
        Policy::try_from(&value).unwrap_err()
    }

    #[test]
    fn test_parse_comparison() {
        let parsed = policy(json!(["==", ".args.foo", 42]));
        assert!(matches!(parsed, Policy::Eq(..)));
        let parsed = policy(json!(["!=", ".args.foo", 42]));
        assert!(matches!(parsed, Policy::Ne(..)));
    }

    #[test]
    fn test_parse_any_of() {
        let parsed = policy(json!(["anyOf", ".args.role", ["admin", "writer"]]));
        assert!(matches!(parsed, Policy::AnyOf(_, options) if options.len() == 2));
    }

    #[test]
    fn test_parse_connectors() {
        let parsed = policy(json!(["and", [["==", ".a", 1], ["!=", ".b", 2]]]));
        assert!(matches!(parsed, Policy::And(children) if children.len() == 2));
        let parsed = policy(json!(["not", ["==", ".a", 1]]));
        assert!(matches!(parsed, Policy::Not(_)));
    }

    #[test]
    fn test_parse_rejects_empty_connector() {
        assert!(matches!(
            parse_error(json!(["and", []])),
            PolicyParseError::EmptyConnector("and")
        ));
        assert!(matches!(
            parse_error(json!(["or", []])),
            PolicyParseError::EmptyConnector("or")
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_operator() {
        assert!(matches!(
            parse_error(json!([">=", ".a", 1])),
            PolicyParseError::UnknownOperator(_)
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_rules() {
        assert!(matches!(
            parse_error(json!(["==", ".a"])),
            PolicyParseError::MalformedRule(_)
        ));
        assert!(matches!(
            parse_error(json!(["anyOf", ".a", 42])),
            PolicyParseError::MalformedRule(_)
        ));
        assert!(matches!(
            parse_error(json!({"op": "=="})),
            PolicyParseError::NotAnArray
        ));
        assert!(matches!(parse_error(json!([])), PolicyParseError::MissingOperator));
    }

    #[test]
    fn test_parse_rejects_bad_selector() {
        assert!(matches!(
            parse_error(json!(["==", "args.foo", 1])),
            PolicyParseError::Selector(_)
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = json!(["and", [["==", ".args.foo", 42], ["not", ["!=", "$.bar", "x"]]]]);
        let parsed = policy(original.clone());
        assert_eq!(serde_json::to_value(&parsed).unwrap(), original);
    }

    #[test]
    fn test_evaluate_eq() {
        let token = json!({"args": {"foo": 42}});
        assert!(policy(json!(["==", ".args.foo", 42])).evaluate(&token, &json!({})));
        assert!(!policy(json!(["==", ".args.foo", 43])).evaluate(&token, &json!({})));
    }

    #[test]
    fn test_evaluate_numbers_by_value() {
        let token = json!({"n": 1});
        assert!(policy(json!(["==", ".n", 1.0])).evaluate(&token, &json!({})));
    }

    #[test]
    fn test_evaluate_deep_equality() {
        let token = json!({"obj": {"a": [1, {"b": 2}]}});
        assert!(policy(json!(["==", ".obj", {"a": [1, {"b": 2}]}])).evaluate(&token, &json!({})));
        assert!(!policy(json!(["==", ".obj", {"a": [1, {"b": 3}]}])).evaluate(&token, &json!({})));
    }

    #[test]
    fn test_undefined_never_equals() {
        let token = json!({"a": 1});
        assert!(!policy(json!(["==", ".missing", 1])).evaluate(&token, &json!({})));
        // and always differs
        assert!(policy(json!(["!=", ".missing", 1])).evaluate(&token, &json!({})));
        assert!(!policy(json!(["anyOf", ".missing", [1, 2]])).evaluate(&token, &json!({})));
    }

    #[test]
    fn test_evaluate_any_of() {
        let token = json!({"role": "writer"});
        assert!(policy(json!(["anyOf", ".role", ["admin", "writer"]])).evaluate(&token, &json!({})));
        assert!(!policy(json!(["anyOf", ".role", ["admin"]])).evaluate(&token, &json!({})));
    }

    #[test]
    fn test_connectors_short_circuit() {
        let token = json!({"flag": true, "deep": 1});
        // The second rule selects through a non-object; or/and must decide
        // on the first rule alone.
        let or = policy(json!(["or", [["==", ".flag", true], ["==", ".deep.never", 1]]]));
        assert!(or.evaluate(&token, &json!({})));
        let and = policy(json!(["and", [["==", ".flag", false], ["==", ".deep.never", 1]]]));
        assert!(!and.evaluate(&token, &json!({})));
    }

    #[test]
    fn test_not() {
        let token = json!({"a": 1});
        assert!(policy(json!(["not", ["==", ".a", 2]])).evaluate(&token, &json!({})));
        assert!(!policy(json!(["not", ["==", ".a", 1]])).evaluate(&token, &json!({})));
    }

    #[test]
    fn test_context_selector() {
        let context = json!({"req": {"bar": 1337}});
        assert!(policy(json!(["==", "$.req.bar", 1337])).evaluate(&json!({}), &context));
        assert!(!policy(json!(["==", "$.req.bar", 1])).evaluate(&json!({}), &context));
    }

    #[test]
    fn test_empty_policy_list_is_true() {
        assert!(Policies::none().evaluate(&json!({}), &json!({})));
    }

    #[test]
    fn test_properties_leaf() {
        let properties = policy(json!(["==", ".a", 1])).properties();
        assert_eq!(properties.max_depth, 1);
        assert_eq!(properties.max_width, 0);
    }

    #[test]
    fn test_properties_nested() {
        let parsed = policy(json!([
            "and",
            [
                ["==", ".a", 1],
                ["or", [["==", ".b", 2], ["==", ".c", 3], ["not", ["==", ".d", 4]]]]
            ]
        ]));
        let properties = parsed.properties();
        // and > or > not > leaf
        assert_eq!(properties.max_depth, 4);
        assert_eq!(properties.max_width, 3);
    }

    #[test]
    fn test_properties_of_list() {
        let policies = Policies::new([
            policy(json!(["==", ".a", 1])),
            policy(json!(["==", ".b", 2])),
            policy(json!(["==", ".c", 3])),
        ]);
        let properties = policies.properties();
        assert_eq!(properties.max_depth, 1);
        assert_eq!(properties.max_width, 3);
    }
}
