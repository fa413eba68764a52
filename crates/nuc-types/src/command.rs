//! Hierarchical command paths and the attenuation rule.
//!
//! A [`Command`] names the operation a token grants or invokes, as an
//! ordered sequence of `/`-separated segments. Authority narrows along a
//! chain: a child command is only acceptable if the parent command's
//! segments are a prefix of it. The distinguished [`REVOKE`] command is
//! exempt from that rule so revocations can cross namespaces.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// The revocation command, `/nuc/revoke`.
///
/// An invocation of this command is allowed to escape the parent's command
/// namespace so that any holder of a token can revoke it.
pub static REVOKE: LazyLock<Command> =
    LazyLock::new(|| Command::new(["nuc".to_string(), "revoke".to_string()]));

/// An ordered sequence of path segments naming an operation.
///
/// The root command `/` has no segments and is the widest authority.
///
/// # Example
///
/// ```
/// use nuc_types::command::Command;
///
/// let parent: Command = "/nil/db".parse().unwrap();
/// let child: Command = "/nil/db/read".parse().unwrap();
/// assert!(child.is_attenuation_of(&parent));
/// assert!(!parent.is_attenuation_of(&child));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Command(Vec<String>);

impl Command {
    /// Creates a command from its segments.
    pub fn new<I: IntoIterator<Item = String>>(segments: I) -> Self {
        Self(segments.into_iter().collect())
    }

    /// The root command `/`.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// The path segments of this command.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether this command narrows (or equals) `other`.
    ///
    /// `a.is_attenuation_of(b)` holds iff `b`'s segments are a prefix of
    /// `a`'s. Every command is an attenuation of itself and of the root.
    pub fn is_attenuation_of(&self, other: &Command) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Error returned when parsing a malformed command string.
#[derive(Debug, thiserror::Error)]
pub enum CommandParseError {
    /// The command does not start with `/`.
    #[error("command must start with '/'")]
    MissingLeadingSlash,
    /// The command contains an empty segment, e.g. `/a//b`.
    #[error("command contains an empty segment")]
    EmptySegment,
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix('/')
            .ok_or(CommandParseError::MissingLeadingSlash)?;
        if rest.is_empty() {
            return Ok(Command::root());
        }
        let segments: Vec<String> = rest.split('/').map(String::from).collect();
        if segments.iter().any(String::is_empty) {
            return Err(CommandParseError::EmptySegment);
        }
        Ok(Command(segments))
    }
}

impl Serialize for Command {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Command::from_str(&s).map_err(de::Error::custom)
    }
}
