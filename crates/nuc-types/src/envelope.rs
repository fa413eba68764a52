//! JWT-style framing of tokens and proof chains.
//!
//! A serialized NUC is `header.payload.signature` with each part base64url
//! encoded without padding. An envelope strings the main token and its
//! proofs together with `/`:
//!
//! ```text
//! <main token> / <proof 1> / <proof 2> …
//! ```
//!
//! Tokens are hashed over their exact serialized bytes, so a received
//! token is never re-serialized: [`SignedNuc`] keeps the raw base64url
//! text it was parsed from alongside the decoded forms.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::token::{NucToken, ProofHash};
use crate::util::Base64UrlBytes;

const ES256K: &str = "ES256K";
const NUC_TYP: &str = "nuc";
const NUC_EIP712_TYP: &str = "nuc+eip712";
const NUC_VERSION: &str = "1.0.0";

/// The EIP-712 domain parameters carried in a `nuc+eip712` header.
///
/// All fields are optional; absent fields are excluded from the domain
/// separator, per EIP-712.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712DomainMeta {
    /// The signing domain name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The domain version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// The EIP-155 chain id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// The verifying contract address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<Address>,
    /// The domain salt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<B256>,
}

/// The typed-data metadata of a `nuc+eip712` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Meta {
    /// The EIP-712 domain under which the payload was signed.
    pub domain: Eip712DomainMeta,
    /// The primary type name; must be `NucPayload`.
    pub primary_type: String,
}

/// A parsed token header.
///
/// Exactly three shapes are accepted; anything else fails parsing:
///
/// | shape | JSON |
/// |-------|------|
/// | legacy | `{"alg":"ES256K"}` |
/// | native | `{"typ":"nuc","alg":"ES256K","ver":"1.0.0"}` |
/// | EIP-712 | `{"typ":"nuc+eip712","alg":"ES256K","ver":"1.0.0","meta":{…}}` |
#[derive(Debug, Clone, PartialEq)]
pub enum NucHeader {
    /// Raw secp256k1 signature, `nil`-method issuer.
    Legacy,
    /// Raw secp256k1 signature, `key`-method issuer.
    Nuc,
    /// EIP-712 typed-data signature, `ethr`-method issuer.
    NucEip712(Eip712Meta),
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Eip712Meta>,
}

impl Serialize for NucHeader {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let wire = match self {
            NucHeader::Legacy => HeaderWire {
                typ: None,
                alg: ES256K.into(),
                ver: None,
                meta: None,
            },
            NucHeader::Nuc => HeaderWire {
                typ: Some(NUC_TYP.into()),
                alg: ES256K.into(),
                ver: Some(NUC_VERSION.into()),
                meta: None,
            },
            NucHeader::NucEip712(meta) => HeaderWire {
                typ: Some(NUC_EIP712_TYP.into()),
                alg: ES256K.into(),
                ver: Some(NUC_VERSION.into()),
                meta: Some(meta.clone()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for NucHeader {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = HeaderWire::deserialize(deserializer)?;
        if wire.alg != ES256K {
            return Err(de::Error::custom(format!("unsupported alg '{}'", wire.alg)));
        }
        match (wire.typ.as_deref(), wire.ver.as_deref(), wire.meta) {
            (None, None, None) => Ok(NucHeader::Legacy),
            (Some(NUC_TYP), Some(NUC_VERSION), None) => Ok(NucHeader::Nuc),
            (Some(NUC_EIP712_TYP), Some(NUC_VERSION), Some(meta)) => {
                Ok(NucHeader::NucEip712(meta))
            }
            _ => Err(de::Error::custom("unrecognized header shape")),
        }
    }
}

/// Error returned when parsing a serialized NUC.
#[derive(Debug, thiserror::Error)]
pub enum NucParseError {
    /// The envelope contains an empty `/`-separated segment.
    #[error("serialized NUC contains an empty token")]
    EmptyToken,
    /// A token does not have exactly three dot-separated parts.
    #[error("token must be three dot-separated base64url parts")]
    InvalidNucStructure,
    /// A token header failed to decode or matches none of the known shapes.
    #[error("token header is not a valid NUC header")]
    InvalidNucHeader,
    /// A part is not valid unpadded base64url.
    #[error("invalid base64url encoding")]
    Base64(#[from] base64::DecodeError),
    /// The payload is not a valid token payload.
    #[error("invalid token payload: {0}")]
    Payload(#[source] serde_json::Error),
}

/// One signed token: the raw wire text it was parsed from (or serialized
/// to) plus the decoded header, payload, and signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedNuc {
    header_b64: String,
    payload_b64: String,
    signature: Vec<u8>,
    header: NucHeader,
    token: NucToken,
}

impl SignedNuc {
    /// Assembles a signed token from its three raw parts, decoding and
    /// validating header and payload.
    pub fn from_parts(
        header_b64: String,
        payload_b64: String,
        signature: Vec<u8>,
    ) -> Result<Self, NucParseError> {
        let header_json = Base64UrlBytes::from(header_b64.as_str()).decode()?;
        let header: NucHeader =
            serde_json::from_slice(&header_json).map_err(|_| NucParseError::InvalidNucHeader)?;
        let payload_json = Base64UrlBytes::from(payload_b64.as_str()).decode()?;
        let token: NucToken =
            serde_json::from_slice(&payload_json).map_err(NucParseError::Payload)?;
        Ok(Self {
            header_b64,
            payload_b64,
            signature,
            header,
            token,
        })
    }

    /// Parses one `header.payload.signature` wire segment.
    pub fn from_wire(segment: &str) -> Result<Self, NucParseError> {
        let parts: Vec<&str> = segment.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = parts.as_slice() else {
            return Err(NucParseError::InvalidNucStructure);
        };
        let signature = Base64UrlBytes::from(*signature_b64).decode()?;
        Self::from_parts((*header_b64).into(), (*payload_b64).into(), signature)
    }

    /// The parsed header.
    pub fn header(&self) -> &NucHeader {
        &self.header
    }

    /// The decoded payload.
    pub fn token(&self) -> &NucToken {
        &self.token
    }

    /// The raw signature bytes.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// The ASCII bytes the signature covers: `header_b64.payload_b64`.
    pub fn signing_message(&self) -> String {
        format!("{}.{}", self.header_b64, self.payload_b64)
    }

    /// The wire form of this token.
    pub fn serialize(&self) -> String {
        format!(
            "{}.{}.{}",
            self.header_b64,
            self.payload_b64,
            Base64UrlBytes::encode(&self.signature)
        )
    }

    /// SHA-256 over the exact wire form, identifying this token in `prf`
    /// arrays.
    pub fn hash(&self) -> ProofHash {
        let digest = Sha256::digest(self.serialize().as_bytes());
        ProofHash(digest.into())
    }
}

impl fmt::Display for SignedNuc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

/// A main token together with the pool of proofs backing it.
///
/// Proof order on the wire is preserved but not semantically significant;
/// the validator reconstructs the chain by hash lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct NucEnvelope {
    token: SignedNuc,
    proofs: Vec<SignedNuc>,
}

impl NucEnvelope {
    /// Wraps a main token and its proof pool.
    pub fn new(token: SignedNuc, proofs: Vec<SignedNuc>) -> Self {
        Self { token, proofs }
    }

    /// The main token.
    pub fn token(&self) -> &SignedNuc {
        &self.token
    }

    /// The proof pool, in wire order.
    pub fn proofs(&self) -> &[SignedNuc] {
        &self.proofs
    }

    /// Consumes the envelope into its main token and proofs.
    pub fn into_parts(self) -> (SignedNuc, Vec<SignedNuc>) {
        (self.token, self.proofs)
    }

    /// The wire form: all tokens joined by `/`, main token first.
    pub fn serialize(&self) -> String {
        let mut out = self.token.serialize();
        for proof in &self.proofs {
            out.push('/');
            out.push_str(&proof.serialize());
        }
        out
    }
}

impl fmt::Display for NucEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

impl FromStr for NucEnvelope {
    type Err = NucParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = Vec::new();
        for segment in s.split('/') {
            if segment.is_empty() {
                return Err(NucParseError::EmptyToken);
            }
            tokens.push(SignedNuc::from_wire(segment)?);
        }
        let mut tokens = tokens.into_iter();
        let token = tokens.next().ok_or(NucParseError::EmptyToken)?;
        let envelope = NucEnvelope::new(token, tokens.collect());
        tracing::trace!(proofs = envelope.proofs.len(), "parsed NUC envelope");
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn did(last_byte: u8) -> String {
        let mut key = [0x02u8; 33];
        key[32] = last_byte;
        format!("did:nil:{}", hex::encode(key))
    }

    fn payload() -> Value {
        json!({
            "iss": did(1),
            "aud": did(2),
            "sub": did(3),
            "cmd": "/nil/db",
            "args": {"foo": 42},
            "nonce": "00112233",
        })
    }

    fn segment(header: Value, payload: Value, signature: &[u8]) -> String {
        format!(
            "{}.{}.{}",
            Base64UrlBytes::encode(serde_json::to_vec(&header).unwrap()),
            Base64UrlBytes::encode(serde_json::to_vec(&payload).unwrap()),
            Base64UrlBytes::encode(signature),
        )
    }

    fn native_header() -> Value {
        json!({"typ": "nuc", "alg": "ES256K", "ver": "1.0.0"})
    }

    #[test]
    fn test_parse_single_token() {
        let wire = segment(native_header(), payload(), &[1u8; 64]);
        let envelope: NucEnvelope = wire.parse().unwrap();
        assert_eq!(envelope.token().header(), &NucHeader::Nuc);
        assert!(envelope.proofs().is_empty());
        assert_eq!(envelope.token().signature(), &[1u8; 64]);
    }

    #[test]
    fn test_parse_legacy_header() {
        let wire = segment(json!({"alg": "ES256K"}), payload(), &[1u8; 64]);
        let envelope: NucEnvelope = wire.parse().unwrap();
        assert_eq!(envelope.token().header(), &NucHeader::Legacy);
    }

    #[test]
    fn test_parse_eip712_header() {
        let header = json!({
            "typ": "nuc+eip712",
            "alg": "ES256K",
            "ver": "1.0.0",
            "meta": {
                "domain": {"name": "nuc", "version": "1", "chainId": 1},
                "primaryType": "NucPayload",
            },
        });
        let wire = segment(header, payload(), &[1u8; 65]);
        let envelope: NucEnvelope = wire.parse().unwrap();
        let NucHeader::NucEip712(meta) = envelope.token().header() else {
            panic!("expected eip712 header");
        };
        assert_eq!(meta.primary_type, "NucPayload");
        assert_eq!(meta.domain.chain_id, Some(1));
    }

    #[test]
    fn test_parse_envelope_with_proofs() {
        let main = segment(native_header(), payload(), &[1u8; 64]);
        let proof = segment(native_header(), payload(), &[2u8; 64]);
        let envelope: NucEnvelope = format!("{main}/{proof}").parse().unwrap();
        assert_eq!(envelope.proofs().len(), 1);
    }

    #[test]
    fn test_roundtrip_preserves_wire_form() {
        let main = segment(native_header(), payload(), &[1u8; 64]);
        let proof = segment(native_header(), payload(), &[2u8; 64]);
        let wire = format!("{main}/{proof}");
        let envelope: NucEnvelope = wire.parse().unwrap();
        assert_eq!(envelope.serialize(), wire);
    }

    #[test]
    fn test_hash_is_deterministic_over_received_bytes() {
        let wire = segment(native_header(), payload(), &[1u8; 64]);
        let first: NucEnvelope = wire.parse().unwrap();
        let second: NucEnvelope = first.serialize().parse().unwrap();
        assert_eq!(first.token().hash(), second.token().hash());
    }

    #[test]
    fn test_rejects_empty_token() {
        let wire = segment(native_header(), payload(), &[1u8; 64]);
        assert!(matches!(
            format!("{wire}//{wire}").parse::<NucEnvelope>(),
            Err(NucParseError::EmptyToken)
        ));
        assert!(matches!(
            "".parse::<NucEnvelope>(),
            Err(NucParseError::EmptyToken)
        ));
    }

    #[test]
    fn test_rejects_wrong_part_count() {
        assert!(matches!(
            "onlyonepart".parse::<NucEnvelope>(),
            Err(NucParseError::InvalidNucStructure)
        ));
        let four = segment(native_header(), payload(), &[1u8; 64]) + ".extra";
        assert!(matches!(
            four.parse::<NucEnvelope>(),
            Err(NucParseError::InvalidNucStructure)
        ));
    }

    #[test]
    fn test_rejects_unknown_header() {
        let wire = segment(json!({"alg": "RS256"}), payload(), &[1u8; 64]);
        assert!(matches!(
            wire.parse::<NucEnvelope>(),
            Err(NucParseError::InvalidNucHeader)
        ));
        let wire = segment(
            json!({"typ": "nuc", "alg": "ES256K", "ver": "2.0.0"}),
            payload(),
            &[1u8; 64],
        );
        assert!(matches!(
            wire.parse::<NucEnvelope>(),
            Err(NucParseError::InvalidNucHeader)
        ));
    }

    #[test]
    fn test_rejects_malformed_payload() {
        let wire = segment(native_header(), json!({"iss": "nope"}), &[1u8; 64]);
        assert!(matches!(
            wire.parse::<NucEnvelope>(),
            Err(NucParseError::Payload(_))
        ));
    }
}
