//! The blockchain payer seam.
//!
//! Subscription payments are settled on the nilchain with a `MsgPayFor`
//! transaction. Broadcasting is host-provided: wallets, hardware signers,
//! and test doubles all implement [`Payer`], and the client only consumes
//! the resulting transaction hash.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use serde_with::serde_as;
use std::fmt;
use std::str::FromStr;

/// Protobuf type URL of the payment message.
pub const MSG_PAY_FOR_TYPE_URL: &str = "/nillion.meta.v1.MsgPayFor";

/// The denomination payments are made in.
pub const UNIL: &str = "unil";

/// A coin amount attached to a payment message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    /// The denomination, `unil` for payments this crate makes.
    pub denom: String,
    /// The amount, stringified to avoid integer precision loss.
    pub amount: String,
}

impl Coin {
    /// A `unil` amount.
    pub fn unil(amount: u64) -> Self {
        Self {
            denom: UNIL.into(),
            amount: amount.to_string(),
        }
    }
}

/// The nilchain payment message, `/nillion.meta.v1.MsgPayFor`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgPayFor {
    /// The resource being paid for, hex-encoded on the wire.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub resource: Vec<u8>,
    /// The paying account address.
    pub from_address: String,
    /// The coins attached to the payment.
    pub amount: Vec<Coin>,
}

/// A committed transaction hash, 32 bytes hex-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Error returned when parsing a malformed transaction hash.
#[derive(Debug, thiserror::Error)]
#[error("transaction hash must be 64 hex characters")]
pub struct TxHashParseError;

impl FromStr for TxHash {
    type Err = TxHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| TxHashParseError)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| TxHashParseError)?;
        Ok(TxHash(bytes))
    }
}

impl Serialize for TxHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        TxHash::from_str(&s).map_err(de::Error::custom)
    }
}

/// Errors that can occur while broadcasting a payment.
#[derive(Debug, thiserror::Error)]
pub enum PayError {
    /// The transaction was rejected or never committed.
    #[error("payment transaction failed: {0}")]
    TransactionFailed(String),
}

/// Broadcasts `MsgPayFor` transactions and reports the committed hash.
///
/// Implementations own the key material and the chain connection; the
/// client code never sees either.
#[async_trait]
pub trait Payer: Send + Sync {
    /// Pays `amount_unil` for the given resource bytes, returning the
    /// transaction hash once the transaction is committed.
    async fn pay(&self, resource: &[u8], amount_unil: u64) -> Result<TxHash, PayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A payer that commits nothing and returns a fixed hash.
    struct StubPayer(TxHash);

    #[async_trait]
    impl Payer for StubPayer {
        async fn pay(&self, _resource: &[u8], _amount_unil: u64) -> Result<TxHash, PayError> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_msg_pay_for_wire_shape() {
        let msg = MsgPayFor {
            resource: vec![0xde, 0xad, 0xbe, 0xef],
            from_address: "nillion1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5lzv7xu".into(),
            amount: vec![Coin::unil(50)],
        };
        let wire = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wire,
            json!({
                "resource": "deadbeef",
                "from_address": "nillion1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5lzv7xu",
                "amount": [{"denom": "unil", "amount": "50"}],
            })
        );
    }

    #[test]
    fn test_tx_hash_roundtrip() {
        let hash: TxHash = "ab".repeat(32).parse().unwrap();
        assert_eq!(hash.to_string(), "ab".repeat(32));
        assert!("abcd".parse::<TxHash>().is_err());
        assert!("zz".repeat(32).parse::<TxHash>().is_err());
    }

    #[tokio::test]
    async fn test_stub_payer() {
        let payer = StubPayer(TxHash([7; 32]));
        let hash = payer.pay(b"resource", 100).await.unwrap();
        assert_eq!(hash, TxHash([7; 32]));
    }
}
