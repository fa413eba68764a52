//! Signing backends for token issuance.
//!
//! A [`NucSigner`] turns an assembled token into signature bytes and fixes
//! two things about the tokens it produces: the header shape and the
//! issuer DID. Local key signers resolve synchronously; typed-data signers
//! may suspend while an external wallet answers, so the interface is
//! uniformly asynchronous and the builder never assumes immediate
//! completion. Dropping the future mid-sign abandons the token with no
//! side effects.

use async_trait::async_trait;

use nuc_types::did::Did;
use nuc_types::envelope::NucHeader;
use nuc_types::token::NucToken;

mod eip712;
mod key;

pub use eip712::{Eip712Signer, NucPayload, eip712_digest};
pub use key::Secp256k1Signer;

/// Everything a signer may need to produce a signature.
///
/// Raw signers consume the ASCII signing message; typed-data signers
/// rebuild structured input from the decoded payload instead.
pub struct SignRequest<'a> {
    /// The ASCII bytes of `header_b64.payload_b64`.
    pub message: &'a [u8],
    /// The decoded payload the message encodes.
    pub token: &'a NucToken,
}

/// Errors that can occur while producing a signature.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The typed-data backend rejected the request.
    #[error("failed to produce typed-data signature")]
    Eip712(#[source] alloy_signer::Error),
    /// The header metadata names a primary type this library cannot sign.
    #[error("unsupported EIP-712 primary type '{0}'")]
    UnsupportedPrimaryType(String),
}

/// A signing backend bound to one identity.
///
/// Implementations must be safe to share across tasks; the builder invokes
/// [`NucSigner::sign`] once per token and awaits the result.
#[async_trait]
pub trait NucSigner: Send + Sync {
    /// The header every token signed by this backend carries.
    fn header(&self) -> NucHeader;

    /// The DID this backend signs as; becomes the token's issuer.
    fn did(&self) -> Did;

    /// Signs a token, returning the raw signature bytes.
    async fn sign(&self, request: SignRequest<'_>) -> Result<Vec<u8>, SignError>;
}
