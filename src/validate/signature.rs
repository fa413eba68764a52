//! Per-token signature verification.
//!
//! The verification strategy is dispatched on the parsed header shape:
//! legacy and native headers carry raw ES256K signatures checked against
//! the issuer's public key, while `nuc+eip712` headers carry typed-data
//! signatures checked by address recovery. The header also pins the
//! issuer's DID method, so a token cannot smuggle a signature strategy
//! its issuer cannot have used.

use alloy_primitives::Signature as EvmSignature;
use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};

use nuc_types::did::DidMethod;
use nuc_types::envelope::{Eip712Meta, NucHeader, SignedNuc};

use crate::signer::eip712_digest;

use super::ValidationError;

/// Verifies one token's signature against its issuer.
pub fn verify_signature(nuc: &SignedNuc) -> Result<(), ValidationError> {
    match nuc.header() {
        NucHeader::Legacy => verify_secp256k1(nuc, DidMethod::Nil),
        NucHeader::Nuc => verify_secp256k1(nuc, DidMethod::Key),
        NucHeader::NucEip712(meta) => verify_eip712(nuc, meta),
    }
}

fn verify_secp256k1(nuc: &SignedNuc, expected_method: DidMethod) -> Result<(), ValidationError> {
    let issuer = &nuc.token().issuer;
    if issuer.method() != expected_method {
        return Err(ValidationError::IssuerMethodMismatch);
    }
    let public_key = issuer
        .public_key()
        .ok_or(ValidationError::IssuerMethodMismatch)?;
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key.as_ref())
        .map_err(|_| ValidationError::SignatureVerificationFailed)?;
    let signature = Signature::from_slice(nuc.signature())
        .map_err(|_| ValidationError::SignatureVerificationFailed)?;
    verifying_key
        .verify(nuc.signing_message().as_bytes(), &signature)
        .map_err(|_| ValidationError::SignatureVerificationFailed)
}

fn verify_eip712(nuc: &SignedNuc, meta: &Eip712Meta) -> Result<(), ValidationError> {
    let issuer = &nuc.token().issuer;
    let issuer_address = issuer
        .address()
        .ok_or(ValidationError::IssuerMethodMismatch)?;
    let digest = eip712_digest(meta, nuc.token())
        .map_err(|_| ValidationError::SignatureVerificationFailed)?;
    let signature = EvmSignature::from_raw(nuc.signature())
        .map_err(|_| ValidationError::SignatureVerificationFailed)?;
    let recovered = signature
        .recover_address_from_prehash(&digest)
        .map_err(|_| ValidationError::SignatureVerificationFailed)?;
    if recovered != issuer_address {
        return Err(ValidationError::SignatureVerificationFailed);
    }
    Ok(())
}
