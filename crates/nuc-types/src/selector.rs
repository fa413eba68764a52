//! Path selectors used by policy rules.
//!
//! A [`Selector`] is a tiny JSON-path dialect with two roots: `.` reads
//! from the token being validated, `$.` reads from the external context
//! supplied to the validator. Applying a selector walks object labels only;
//! any missing label or non-object traversal yields "undefined" (`None`)
//! rather than an error.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[A-Za-z0-9_-]+$").expect("invalid attribute regex"));

/// The JSON value a selector reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorTarget {
    /// The token payload under validation.
    Token,
    /// The external context object supplied by the caller.
    Context,
}

/// A parsed path expression, e.g. `.args.foo` or `$.req.user-id`.
///
/// # Example
///
/// ```
/// use nuc_types::selector::Selector;
/// use serde_json::json;
///
/// let selector: Selector = ".args.foo".parse().unwrap();
/// let token = json!({"args": {"foo": 42}});
/// assert_eq!(selector.apply(&token, &json!({})), Some(&json!(42)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    target: SelectorTarget,
    path: Vec<String>,
}

impl Selector {
    /// The value this selector reads from.
    pub fn target(&self) -> SelectorTarget {
        self.target
    }

    /// The attribute path, empty for the root selector.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Resolves this selector against a token payload and context.
    ///
    /// Returns `None` ("undefined") when any label along the path is
    /// missing or an intermediate value is not an object.
    pub fn apply<'a>(
        &self,
        token: &'a serde_json::Value,
        context: &'a serde_json::Value,
    ) -> Option<&'a serde_json::Value> {
        let root = match self.target {
            SelectorTarget::Token => token,
            SelectorTarget::Context => context,
        };
        self.path.iter().try_fold(root, |value, label| {
            value.as_object().and_then(|object| object.get(label))
        })
    }
}

/// Error returned when parsing a malformed selector string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SelectorParseError {
    /// The selector does not start with `.` or `$.`.
    #[error("selector must start with '.' or '$.'")]
    InvalidPrefix,
    /// The selector contains an empty attribute, e.g. `.a..b`.
    #[error("selector contains an empty attribute")]
    EmptyAttribute,
    /// An attribute contains a character outside `[A-Za-z0-9_-]`.
    #[error("invalid character in selector attribute '{0}'")]
    InvalidAttributeChar(String),
}

impl FromStr for Selector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, rest) = if let Some(rest) = s.strip_prefix("$.") {
            (SelectorTarget::Context, rest)
        } else if let Some(rest) = s.strip_prefix('.') {
            (SelectorTarget::Token, rest)
        } else {
            return Err(SelectorParseError::InvalidPrefix);
        };
        if rest.is_empty() {
            return Ok(Selector { target, path: Vec::new() });
        }
        let mut path = Vec::new();
        for attribute in rest.split('.') {
            if attribute.is_empty() {
                return Err(SelectorParseError::EmptyAttribute);
            }
            if !ATTRIBUTE.is_match(attribute) {
                return Err(SelectorParseError::InvalidAttributeChar(attribute.into()));
            }
            path.push(attribute.to_string());
        }
        Ok(Selector { target, path })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.target {
            SelectorTarget::Token => ".",
            SelectorTarget::Context => "$.",
        };
        write!(f, "{prefix}{}", self.path.join("."))
    }
}

impl Serialize for Selector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Selector::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn selector(s: &str) -> Selector {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_token_root() {
        let root = selector(".");
        assert_eq!(root.target(), SelectorTarget::Token);
        assert!(root.path().is_empty());
    }

    #[test]
    fn test_parse_context_root() {
        let root = selector("$.");
        assert_eq!(root.target(), SelectorTarget::Context);
        assert!(root.path().is_empty());
    }

    #[test]
    fn test_parse_paths() {
        assert_eq!(selector(".a.b").path(), ["a", "b"]);
        assert_eq!(selector("$.req.user-id").path(), ["req", "user-id"]);
        assert_eq!(selector(".under_score").path(), ["under_score"]);
    }

    #[test]
    fn test_bare_dollar_fails() {
        assert_eq!(
            "$".parse::<Selector>(),
            Err(SelectorParseError::InvalidPrefix)
        );
    }

    #[test]
    fn test_missing_prefix_fails() {
        assert_eq!(
            "a.b".parse::<Selector>(),
            Err(SelectorParseError::InvalidPrefix)
        );
        assert_eq!("".parse::<Selector>(), Err(SelectorParseError::InvalidPrefix));
    }

    #[test]
    fn test_empty_attribute_fails() {
        assert_eq!(
            ".a..b".parse::<Selector>(),
            Err(SelectorParseError::EmptyAttribute)
        );
        assert_eq!(
            ".a.".parse::<Selector>(),
            Err(SelectorParseError::EmptyAttribute)
        );
    }

    #[test]
    fn test_invalid_character_fails() {
        assert!(matches!(
            ".a!b".parse::<Selector>(),
            Err(SelectorParseError::InvalidAttributeChar(_))
        ));
        assert!(matches!(
            ".a b".parse::<Selector>(),
            Err(SelectorParseError::InvalidAttributeChar(_))
        ));
    }

    #[test]
    fn test_apply_root_returns_whole_value() {
        let token = json!({"a": {"b": 1}});
        assert_eq!(selector(".").apply(&token, &json!({})), Some(&token));
    }

    #[test]
    fn test_apply_walks_labels() {
        let token = json!({"a": {"b": 42}});
        assert_eq!(selector(".a.b").apply(&token, &json!({})), Some(&json!(42)));
    }

    #[test]
    fn test_apply_missing_label_is_undefined() {
        let token = json!({"a": {"b": 42}});
        assert_eq!(selector(".a.c").apply(&token, &json!({})), None);
        assert_eq!(selector(".x").apply(&token, &json!({})), None);
    }

    #[test]
    fn test_apply_through_non_object_is_undefined() {
        let token = json!({"a": [1, 2, 3]});
        assert_eq!(selector(".a.b").apply(&token, &json!({})), None);
    }

    #[test]
    fn test_apply_context_target() {
        let context = json!({"req": {"bar": 1337}});
        assert_eq!(
            selector("$.req.bar").apply(&json!({}), &context),
            Some(&json!(1337))
        );
    }

    #[test]
    fn test_display_roundtrip() {
        for input in [".", "$.", ".a.b", "$.req.bar"] {
            assert_eq!(selector(input).to_string(), input);
        }
    }
}
