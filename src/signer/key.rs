//! Raw secp256k1 signing.
//!
//! Both the legacy (`nil`) and native (`key`) forms sign the ASCII message
//! `header_b64.payload_b64` with ES256K: ECDSA over secp256k1 with a
//! SHA-256 prehash, emitted as the 64-byte compact encoding. The two forms
//! differ only in the header they stamp and the DID method the issuer
//! serializes under.

use async_trait::async_trait;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use nuc_types::did::Did;
use nuc_types::envelope::NucHeader;

use super::{NucSigner, SignError, SignRequest};

/// A local secp256k1 signer.
///
/// # Example
///
/// ```
/// use k256::ecdsa::SigningKey;
/// use nuc_rs::signer::{NucSigner, Secp256k1Signer};
///
/// let key = SigningKey::from_slice(&[0x11; 32]).unwrap();
/// let signer = Secp256k1Signer::new(key);
/// assert!(signer.did().to_string().starts_with("did:key:z"));
/// ```
pub struct Secp256k1Signer {
    signing_key: SigningKey,
    header: NucHeader,
    did: Did,
}

impl Secp256k1Signer {
    /// Creates a native signer issuing as `did:key` with the `nuc` header.
    pub fn new(signing_key: SigningKey) -> Self {
        let public_key = compressed_public_key(&signing_key);
        Self {
            signing_key,
            header: NucHeader::Nuc,
            did: Did::key(public_key),
        }
    }

    /// Creates a legacy signer issuing as `did:nil` with the bare header.
    pub fn legacy(signing_key: SigningKey) -> Self {
        let public_key = compressed_public_key(&signing_key);
        Self {
            signing_key,
            header: NucHeader::Legacy,
            did: Did::nil(public_key),
        }
    }

    /// The 33-byte compressed public key of this signer.
    pub fn public_key(&self) -> [u8; 33] {
        compressed_public_key(&self.signing_key)
    }
}

fn compressed_public_key(signing_key: &SigningKey) -> [u8; 33] {
    let point = signing_key.verifying_key().to_encoded_point(true);
    point
        .as_bytes()
        .try_into()
        .expect("compressed secp256k1 point must be 33 bytes")
}

#[async_trait]
impl NucSigner for Secp256k1Signer {
    fn header(&self) -> NucHeader {
        self.header.clone()
    }

    fn did(&self) -> Did {
        self.did
    }

    async fn sign(&self, request: SignRequest<'_>) -> Result<Vec<u8>, SignError> {
        let signature: Signature = self.signing_key.sign(request.message);
        Ok(signature.to_bytes().to_vec())
    }
}
