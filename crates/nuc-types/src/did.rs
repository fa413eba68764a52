//! Decentralized identifiers for token issuers, audiences, and subjects.
//!
//! Every party in a NUC chain is named by a [`Did`] in one of three methods:
//!
//! - **`nil`**: a 33-byte compressed secp256k1 public key, hex-encoded
//!   (`did:nil:02ab…`). The legacy form.
//! - **`key`**: the same key material in multibase form, base58btc with the
//!   secp256k1-pub multicodec prefix (`did:key:zQ3s…`).
//! - **`ethr`**: a 20-byte Ethereum address (`did:ethr:0x…`), used by
//!   EIP-712 signed tokens.
//!
//! Equality is byte-exact over the canonical serialization: two DIDs are the
//! same party only if their method and key material match.

use alloy_primitives::Address;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// Multicodec prefix for a compressed secp256k1 public key (0xe7 as varint).
const MULTICODEC_SECP256K1_PUB: [u8; 2] = [0xe7, 0x01];

/// A compressed secp256k1 public key as carried by `nil` and `key` DIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; 33]);

impl PublicKey {
    /// Returns the raw SEC1 compressed key bytes.
    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = DidParseError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; 33] = bytes
            .try_into()
            .map_err(|_| DidParseError::InvalidKeyLength(bytes.len()))?;
        Ok(PublicKey(bytes))
    }
}

/// The method tag of a [`Did`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DidMethod {
    /// Legacy hex-encoded secp256k1 key.
    Nil,
    /// Multibase-encoded secp256k1 key.
    Key,
    /// Ethereum address.
    Ethr,
}

impl fmt::Display for DidMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DidMethod::Nil => "nil",
            DidMethod::Key => "key",
            DidMethod::Ethr => "ethr",
        };
        write!(f, "{name}")
    }
}

/// A decentralized identifier naming one party of a token.
///
/// # Serialization
///
/// Serializes to/from the canonical string form:
///
/// ```
/// use nuc_types::did::Did;
///
/// let did: Did = "did:nil:02c00bad5f7a6a1bd2c1b915eaca40b95342ae9adfd2eb26771ab917bbb6b0f553"
///     .parse()
///     .unwrap();
/// assert_eq!(
///     serde_json::to_string(&did).unwrap(),
///     "\"did:nil:02c00bad5f7a6a1bd2c1b915eaca40b95342ae9adfd2eb26771ab917bbb6b0f553\""
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Did {
    /// `did:nil:<hex33>`
    Nil(PublicKey),
    /// `did:key:<multibase>`
    Key(PublicKey),
    /// `did:ethr:<0x-address>`
    Ethr(Address),
}

impl Did {
    /// Builds a legacy `nil` DID from 33 raw compressed key bytes.
    pub fn nil(public_key: [u8; 33]) -> Self {
        Did::Nil(PublicKey(public_key))
    }

    /// Builds a native `key` DID from 33 raw compressed key bytes.
    pub fn key(public_key: [u8; 33]) -> Self {
        Did::Key(PublicKey(public_key))
    }

    /// Builds an `ethr` DID from a 20-byte Ethereum address.
    pub fn ethr(address: Address) -> Self {
        Did::Ethr(address)
    }

    /// Builds a legacy `nil` DID from a hex-encoded compressed public key.
    pub fn from_hex(hex_key: &str) -> Result<Self, DidParseError> {
        let bytes = hex::decode(hex_key).map_err(|_| DidParseError::InvalidHexKey)?;
        let key = PublicKey::try_from(bytes.as_slice())?;
        Ok(Did::Nil(key))
    }

    /// The method tag of this DID.
    pub fn method(&self) -> DidMethod {
        match self {
            Did::Nil(_) => DidMethod::Nil,
            Did::Key(_) => DidMethod::Key,
            Did::Ethr(_) => DidMethod::Ethr,
        }
    }

    /// The secp256k1 public key, if this DID carries one.
    pub fn public_key(&self) -> Option<&PublicKey> {
        match self {
            Did::Nil(key) | Did::Key(key) => Some(key),
            Did::Ethr(_) => None,
        }
    }

    /// The Ethereum address, if this DID is `ethr`.
    pub fn address(&self) -> Option<Address> {
        match self {
            Did::Ethr(address) => Some(*address),
            _ => None,
        }
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Did::Nil(key) => write!(f, "did:nil:{}", hex::encode(key.0)),
            Did::Key(key) => {
                let mut multicodec = Vec::with_capacity(2 + key.0.len());
                multicodec.extend_from_slice(&MULTICODEC_SECP256K1_PUB);
                multicodec.extend_from_slice(&key.0);
                write!(f, "did:key:z{}", bs58::encode(multicodec).into_string())
            }
            Did::Ethr(address) => write!(f, "did:ethr:{address}"),
        }
    }
}

/// Error returned when parsing a malformed DID string.
#[derive(Debug, thiserror::Error)]
pub enum DidParseError {
    /// The string does not start with the `did:` prefix.
    #[error("DID must start with 'did:'")]
    MissingPrefix,
    /// The method is not one of `nil`, `key`, `ethr`.
    #[error("unknown DID method '{0}'")]
    UnknownMethod(String),
    /// The key material is not valid hex.
    #[error("DID key is not valid hex")]
    InvalidHexKey,
    /// The key material has the wrong length.
    #[error("DID key must be 33 bytes, got {0}")]
    InvalidKeyLength(usize),
    /// The `key` method payload is not valid multibase.
    #[error("DID key is not valid base58btc multibase")]
    InvalidMultibase,
    /// The `ethr` method payload is not a valid 0x-prefixed address.
    #[error("DID address is not a valid Ethereum address")]
    InvalidAddress,
}

impl FromStr for Did {
    type Err = DidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("did:").ok_or(DidParseError::MissingPrefix)?;
        let (method, payload) = rest
            .split_once(':')
            .ok_or_else(|| DidParseError::UnknownMethod(rest.into()))?;
        match method {
            "nil" => Did::from_hex(payload),
            "key" => {
                let encoded = payload
                    .strip_prefix('z')
                    .ok_or(DidParseError::InvalidMultibase)?;
                let decoded = bs58::decode(encoded)
                    .into_vec()
                    .map_err(|_| DidParseError::InvalidMultibase)?;
                let key_bytes = decoded
                    .strip_prefix(MULTICODEC_SECP256K1_PUB.as_slice())
                    .ok_or(DidParseError::InvalidMultibase)?;
                let key = PublicKey::try_from(key_bytes)?;
                Ok(Did::Key(key))
            }
            "ethr" => {
                if !payload.starts_with("0x") {
                    return Err(DidParseError::InvalidAddress);
                }
                let address =
                    Address::from_str(payload).map_err(|_| DidParseError::InvalidAddress)?;
                Ok(Did::Ethr(address))
            }
            other => Err(DidParseError::UnknownMethod(other.into())),
        }
    }
}

impl Serialize for Did {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Did::from_str(&s).map_err(de::Error::custom)
    }
}
