//! EIP-712 typed-data signing.
//!
//! Ethereum wallets cannot produce raw ES256K signatures over opaque
//! bytes, so `ethr`-issued tokens are signed as EIP-712 typed data
//! instead: the payload is projected onto the fixed [`NucPayload`] struct
//! and hashed under the domain carried in the token header. Verifiers
//! rebuild the same digest from the header metadata and recover the
//! signer address from the 65-byte `r||s||v` signature.

use alloy_primitives::{Address, B256, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Eip712Domain, SolStruct, sol};
use async_trait::async_trait;
use std::borrow::Cow;

use nuc_types::did::Did;
use nuc_types::envelope::{Eip712DomainMeta, Eip712Meta, NucHeader};
use nuc_types::token::{NucToken, TokenBody};

use super::{NucSigner, SignError, SignRequest};

/// The primary type every `nuc+eip712` header must declare.
pub const NUC_PAYLOAD_TYPE: &str = "NucPayload";

sol! {
    /// The typed-data projection of a token payload.
    ///
    /// Optional validity bounds are zero when absent; `body` holds the
    /// JSON text of `args` or `pol`, and `meta` the JSON text of the
    /// metadata object or the empty string.
    #[derive(Debug)]
    struct NucPayload {
        string iss;
        string aud;
        string sub;
        string cmd;
        uint256 nbf;
        uint256 exp;
        string body;
        string nonce;
        string[] prf;
        string meta;
    }
}

fn typed_payload(token: &NucToken) -> NucPayload {
    let body = match &token.body {
        TokenBody::Delegation(policies) => {
            serde_json::to_string(policies).expect("policy list must serialize")
        }
        TokenBody::Invocation(arguments) => {
            serde_json::to_string(arguments).expect("invocation arguments must serialize")
        }
    };
    let meta = match &token.meta {
        Some(meta) => serde_json::to_string(meta).expect("token metadata must serialize"),
        None => String::new(),
    };
    NucPayload {
        iss: token.issuer.to_string(),
        aud: token.audience.to_string(),
        sub: token.subject.to_string(),
        cmd: token.command.to_string(),
        nbf: token.not_before.map(|ts| U256::from(ts.as_secs())).unwrap_or(U256::ZERO),
        exp: token.expires_at.map(|ts| U256::from(ts.as_secs())).unwrap_or(U256::ZERO),
        body,
        nonce: hex::encode(&token.nonce),
        prf: token.proofs.iter().map(ToString::to_string).collect(),
        meta,
    }
}

fn domain(meta: &Eip712DomainMeta) -> Eip712Domain {
    Eip712Domain::new(
        meta.name.clone().map(Cow::Owned),
        meta.version.clone().map(Cow::Owned),
        meta.chain_id.map(U256::from),
        meta.verifying_contract,
        meta.salt,
    )
}

/// Computes the EIP-712 signing digest of a token payload under the
/// domain declared in its header metadata.
///
/// # Errors
///
/// Fails if the metadata names a primary type other than `NucPayload`.
pub fn eip712_digest(meta: &Eip712Meta, token: &NucToken) -> Result<B256, SignError> {
    if meta.primary_type != NUC_PAYLOAD_TYPE {
        return Err(SignError::UnsupportedPrimaryType(meta.primary_type.clone()));
    }
    let payload = typed_payload(token);
    Ok(payload.eip712_signing_hash(&domain(&meta.domain)))
}

/// A typed-data signer issuing as `did:ethr`.
///
/// Wraps an in-process key; wallet-backed implementations of
/// [`NucSigner`] follow the same shape, suspending in `sign` while the
/// wallet answers.
pub struct Eip712Signer {
    signer: PrivateKeySigner,
    meta: Eip712Meta,
}

impl Eip712Signer {
    /// Creates a signer stamping the given domain into token headers.
    pub fn new(signer: PrivateKeySigner, domain: Eip712DomainMeta) -> Self {
        Self {
            signer,
            meta: Eip712Meta {
                domain,
                primary_type: NUC_PAYLOAD_TYPE.into(),
            },
        }
    }

    /// The address this signer issues under.
    pub fn address(&self) -> Address {
        self.signer.address()
    }
}

#[async_trait]
impl NucSigner for Eip712Signer {
    fn header(&self) -> NucHeader {
        NucHeader::NucEip712(self.meta.clone())
    }

    fn did(&self) -> Did {
        Did::ethr(self.signer.address())
    }

    async fn sign(&self, request: SignRequest<'_>) -> Result<Vec<u8>, SignError> {
        let digest = eip712_digest(&self.meta, request.token)?;
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(SignError::Eip712)?;
        Ok(signature.as_bytes().to_vec())
    }
}
