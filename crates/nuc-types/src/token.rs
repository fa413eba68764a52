//! The NUC token payload.
//!
//! A [`NucToken`] is the decoded JWT-style payload of one token in a chain.
//! Its body discriminates the two token kinds: a **delegation** carries a
//! policy list (`pol`), an **invocation** carries the arguments being
//! invoked (`args`). A payload with both or neither is malformed and is
//! rejected during deserialization.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_json::{Map, Value};
use serde_with::serde_as;
use std::fmt;
use std::str::FromStr;

use crate::command::Command;
use crate::did::Did;
use crate::policy::Policies;
use crate::timestamp::UnixTimestamp;

/// SHA-256 hash of a serialized token, linking a token to its proof.
///
/// Hex-encoded on the wire inside the `prf` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProofHash(pub [u8; 32]);

impl fmt::Display for ProofHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Error returned when parsing a malformed proof hash.
#[derive(Debug, thiserror::Error)]
#[error("proof hash must be 64 hex characters")]
pub struct ProofHashParseError;

impl FromStr for ProofHash {
    type Err = ProofHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ProofHashParseError)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| ProofHashParseError)?;
        Ok(ProofHash(bytes))
    }
}

impl Serialize for ProofHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ProofHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ProofHash::from_str(&s).map_err(de::Error::custom)
    }
}

/// The discriminated body of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenBody {
    /// A delegation narrowing authority under a policy list (`pol`).
    Delegation(Policies),
    /// An invocation actually exercising authority (`args`).
    Invocation(Map<String, Value>),
}

impl TokenBody {
    /// The policy list, if this is a delegation.
    pub fn policies(&self) -> Option<&Policies> {
        match self {
            TokenBody::Delegation(policies) => Some(policies),
            TokenBody::Invocation(_) => None,
        }
    }

    /// The invocation arguments, if this is an invocation.
    pub fn arguments(&self) -> Option<&Map<String, Value>> {
        match self {
            TokenBody::Invocation(arguments) => Some(arguments),
            TokenBody::Delegation(_) => None,
        }
    }
}

/// A decoded token payload.
///
/// # Wire format
///
/// ```json
/// {
///   "iss": "did:nil:02…",
///   "aud": "did:nil:03…",
///   "sub": "did:nil:02…",
///   "cmd": "/nil/db/read",
///   "pol": [["==", ".args.collection", "orders"]],
///   "nonce": "f2a9c1d0b47e83125a90cc34d1f06a77",
///   "prf": []
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NucToken {
    /// The party that signed this token.
    pub issuer: Did,
    /// The party this token is addressed to.
    pub audience: Did,
    /// The party whose authority the chain carries.
    pub subject: Did,
    /// The command this token grants or invokes.
    pub command: Command,
    /// Earliest validity time, if bounded.
    pub not_before: Option<UnixTimestamp>,
    /// Expiry time, if bounded.
    pub expires_at: Option<UnixTimestamp>,
    /// Delegation policies or invocation arguments.
    pub body: TokenBody,
    /// Replay-protection nonce, arbitrary bytes.
    pub nonce: Vec<u8>,
    /// Hashes of the proof tokens this one extends, parent first.
    pub proofs: Vec<ProofHash>,
    /// Opaque application metadata.
    pub meta: Option<Map<String, Value>>,
}

impl NucToken {
    /// Whether this token is a delegation.
    pub fn is_delegation(&self) -> bool {
        matches!(self.body, TokenBody::Delegation(_))
    }

    /// Whether this token is an invocation.
    pub fn is_invocation(&self) -> bool {
        matches!(self.body, TokenBody::Invocation(_))
    }

    /// The wire-shaped JSON of this payload, as policy selectors see it.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("token payload must serialize")
    }
}

#[serde_as]
#[derive(Serialize, Deserialize)]
struct TokenWire {
    iss: Did,
    aud: Did,
    sub: Did,
    cmd: Command,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<UnixTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pol: Option<Policies>,
    #[serde_as(as = "serde_with::hex::Hex")]
    nonce: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    prf: Vec<ProofHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Map<String, Value>>,
}

impl Serialize for NucToken {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (args, pol) = match &self.body {
            TokenBody::Delegation(policies) => (None, Some(policies.clone())),
            TokenBody::Invocation(arguments) => (Some(arguments.clone()), None),
        };
        TokenWire {
            iss: self.issuer,
            aud: self.audience,
            sub: self.subject,
            cmd: self.command.clone(),
            nbf: self.not_before,
            exp: self.expires_at,
            args,
            pol,
            nonce: self.nonce.clone(),
            prf: self.proofs.clone(),
            meta: self.meta.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NucToken {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = TokenWire::deserialize(deserializer)?;
        let body = match (wire.args, wire.pol) {
            (Some(arguments), None) => TokenBody::Invocation(arguments),
            (None, Some(policies)) => TokenBody::Delegation(policies),
            (Some(_), Some(_)) => {
                return Err(de::Error::custom(
                    "token carries both 'args' and 'pol'; exactly one is required",
                ));
            }
            (None, None) => {
                return Err(de::Error::custom(
                    "token carries neither 'args' nor 'pol'; exactly one is required",
                ));
            }
        };
        Ok(NucToken {
            issuer: wire.iss,
            audience: wire.aud,
            subject: wire.sub,
            command: wire.cmd,
            not_before: wire.nbf,
            expires_at: wire.exp,
            body,
            nonce: wire.nonce,
            proofs: wire.prf,
            meta: wire.meta,
        })
    }
}
