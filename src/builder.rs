//! Fluent construction of signed tokens.
//!
//! A [`NucTokenBuilder`] assembles one token, either as a chain root or
//! extending a previously received envelope, and hands it to a
//! [`NucSigner`](crate::signer::NucSigner) to produce the final
//! [`NucEnvelope`]. Chain constraints that the validator would reject
//! later, same subject, issuer matching the parent audience, command
//! attenuation, nested validity windows, are checked before signing so a
//! misconfigured builder fails fast instead of minting a dead token.

use rand::Rng;
use serde_json::{Map, Value};

use nuc_types::command::{Command, REVOKE};
use nuc_types::did::Did;
use nuc_types::envelope::{NucEnvelope, NucParseError, SignedNuc};
use nuc_types::policy::Policies;
use nuc_types::timestamp::UnixTimestamp;
use nuc_types::token::{NucToken, TokenBody};
use nuc_types::util::Base64UrlBytes;

use crate::signer::{NucSigner, SignError, SignRequest};

/// Errors that can occur while building and signing a token.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A required field was never set.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    /// The subject differs from the parent token's subject.
    #[error("subject must match the parent token subject")]
    SubjectMismatch,
    /// The signer's DID is not the parent token's audience.
    #[error("issuer must be the parent token audience")]
    IssuerMismatch,
    /// The command does not narrow the parent command.
    #[error("command must be an attenuation of the parent command")]
    CommandNotAttenuated,
    /// The validity window escapes the parent's window.
    #[error("validity window must nest within the parent window")]
    InvalidTemporalWindow,
    /// Encoding the header or payload to JSON failed.
    #[error("failed to encode token")]
    Encode(#[from] serde_json::Error),
    /// The signer failed to produce a signature.
    #[error(transparent)]
    Sign(#[from] SignError),
    /// The signed token failed to reassemble; indicates a broken signer.
    #[error("signed token is malformed")]
    Malformed(#[source] NucParseError),
}

/// Builds one token, as a chain root or extending an envelope.
///
/// # Example
///
/// ```no_run
/// use nuc_rs::builder::NucTokenBuilder;
/// use nuc_types::policy::Policies;
///
/// # async fn example(
/// #     signer: impl nuc_rs::signer::NucSigner,
/// #     audience: nuc_types::did::Did,
/// #     subject: nuc_types::did::Did,
/// # ) -> Result<(), nuc_rs::builder::BuildError> {
/// let envelope = NucTokenBuilder::delegation(Policies::none())
///     .audience(audience)
///     .subject(subject)
///     .command("/nil/db".parse().unwrap())
///     .expires_in(3600)
///     .sign(&signer)
///     .await?;
/// println!("{envelope}");
/// # Ok(())
/// # }
/// ```
pub struct NucTokenBuilder {
    body: TokenBody,
    base: Option<NucEnvelope>,
    audience: Option<Did>,
    subject: Option<Did>,
    command: Option<Command>,
    not_before: Option<UnixTimestamp>,
    expires_at: Option<UnixTimestamp>,
    expires_in: Option<u64>,
    nonce: Option<Vec<u8>>,
    meta: Option<Map<String, Value>>,
}

impl NucTokenBuilder {
    fn new(body: TokenBody, base: Option<NucEnvelope>) -> Self {
        Self {
            body,
            base,
            audience: None,
            subject: None,
            command: None,
            not_before: None,
            expires_at: None,
            expires_in: None,
            nonce: None,
            meta: None,
        }
    }

    /// Starts a root delegation carrying the given policies.
    pub fn delegation(policies: Policies) -> Self {
        Self::new(TokenBody::Delegation(policies), None)
    }

    /// Starts a root invocation carrying the given arguments.
    pub fn invocation(arguments: Map<String, Value>) -> Self {
        Self::new(TokenBody::Invocation(arguments), None)
    }

    /// Starts a delegation extending the given envelope. The envelope's
    /// main token becomes this token's proof, carrying its own proofs
    /// along.
    pub fn delegation_from(parent: NucEnvelope, policies: Policies) -> Self {
        let mut builder = Self::new(TokenBody::Delegation(policies), Some(parent));
        builder.subject = builder
            .base
            .as_ref()
            .map(|parent| parent.token().token().subject);
        builder
    }

    /// Starts an invocation extending the given envelope.
    pub fn invocation_from(parent: NucEnvelope, arguments: Map<String, Value>) -> Self {
        let mut builder = Self::new(TokenBody::Invocation(arguments), Some(parent));
        builder.subject = builder
            .base
            .as_ref()
            .map(|parent| parent.token().token().subject);
        builder
    }

    /// Sets the party this token is addressed to. Required.
    pub fn audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    /// Sets the subject whose authority the chain carries. Required for
    /// roots; defaults to the parent's subject when extending.
    pub fn subject(mut self, subject: Did) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the command this token grants or invokes. Required.
    pub fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Bounds validity from below.
    pub fn not_before(mut self, not_before: UnixTimestamp) -> Self {
        self.not_before = Some(not_before);
        self
    }

    /// Sets an absolute expiry time.
    pub fn expires_at(mut self, expires_at: UnixTimestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets expiry relative to the signing time, in seconds. Ignored when
    /// an absolute expiry is set.
    pub fn expires_in(mut self, seconds: u64) -> Self {
        self.expires_in = Some(seconds);
        self
    }

    /// Overrides the random nonce; useful for deterministic tests.
    pub fn nonce<N: Into<Vec<u8>>>(mut self, nonce: N) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Attaches opaque metadata to the payload.
    pub fn meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Signs the assembled token and returns the resulting envelope.
    ///
    /// The signer fixes the issuer and header. Signing is awaited; local
    /// key signers resolve immediately, wallet-backed signers when the
    /// wallet answers. Dropping the future leaves no trace of the token.
    pub async fn sign(self, signer: &dyn NucSigner) -> Result<NucEnvelope, BuildError> {
        let audience = self.audience.ok_or(BuildError::MissingField("audience"))?;
        let subject = self.subject.ok_or(BuildError::MissingField("subject"))?;
        let command = self.command.ok_or(BuildError::MissingField("command"))?;
        let issuer = signer.did();

        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => Some(at),
            (None, Some(seconds)) => Some(UnixTimestamp::now() + seconds),
            (None, None) => None,
        };

        let mut proofs = Vec::new();
        if let Some(parent_envelope) = &self.base {
            let parent = parent_envelope.token().token();
            if subject != parent.subject {
                return Err(BuildError::SubjectMismatch);
            }
            if issuer != parent.audience {
                return Err(BuildError::IssuerMismatch);
            }
            if command != *REVOKE && !command.is_attenuation_of(&parent.command) {
                return Err(BuildError::CommandNotAttenuated);
            }
            if let (Some(not_before), Some(parent_nbf)) = (self.not_before, parent.not_before)
                && not_before < parent_nbf
            {
                return Err(BuildError::InvalidTemporalWindow);
            }
            if let (Some(expiry), Some(parent_exp)) = (expires_at, parent.expires_at)
                && expiry > parent_exp
            {
                return Err(BuildError::InvalidTemporalWindow);
            }
            proofs.push(parent_envelope.token().hash());
        }

        let nonce = self
            .nonce
            .unwrap_or_else(|| rand::rng().random::<[u8; 16]>().to_vec());

        let token = NucToken {
            issuer,
            audience,
            subject,
            command,
            not_before: self.not_before,
            expires_at,
            body: self.body,
            nonce,
            proofs,
            meta: self.meta,
        };

        let header_b64 = Base64UrlBytes::encode(serde_json::to_vec(&signer.header())?).to_string();
        let payload_b64 = Base64UrlBytes::encode(serde_json::to_vec(&token)?).to_string();
        let message = format!("{header_b64}.{payload_b64}");
        let signature = signer
            .sign(SignRequest {
                message: message.as_bytes(),
                token: &token,
            })
            .await?;

        let signed = SignedNuc::from_parts(header_b64, payload_b64, signature)
            .map_err(BuildError::Malformed)?;

        let proofs = match self.base {
            Some(parent_envelope) => {
                let (parent_main, parent_proofs) = parent_envelope.into_parts();
                let mut proofs = Vec::with_capacity(1 + parent_proofs.len());
                proofs.push(parent_main);
                proofs.extend(parent_proofs);
                proofs
            }
            None => Vec::new(),
        };
        Ok(NucEnvelope::new(signed, proofs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Secp256k1Signer;
    use k256::ecdsa::SigningKey;
    use serde_json::json;

    fn signer(seed: u8) -> Secp256k1Signer {
        Secp256k1Signer::new(SigningKey::from_slice(&[seed; 32]).unwrap())
    }

    fn arguments(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected() {
        let root = signer(1);
        let result = NucTokenBuilder::delegation(Policies::none())
            .subject(root.did())
            .command("/nil".parse().unwrap())
            .sign(&root)
            .await;
        assert!(matches!(result, Err(BuildError::MissingField("audience"))));
    }

    #[tokio::test]
    async fn test_root_delegation() {
        let root = signer(1);
        let holder = signer(2);
        let envelope = NucTokenBuilder::delegation(Policies::none())
            .audience(holder.did())
            .subject(root.did())
            .command("/nil".parse().unwrap())
            .sign(&root)
            .await
            .unwrap();

        let token = envelope.token().token();
        assert_eq!(token.issuer, root.did());
        assert_eq!(token.audience, holder.did());
        assert_eq!(token.nonce.len(), 16);
        assert!(token.proofs.is_empty());
        assert!(envelope.proofs().is_empty());
    }

    #[tokio::test]
    async fn test_chained_invocation_carries_proofs() {
        let root = signer(1);
        let holder = signer(2);
        let service = signer(3);

        let delegation = NucTokenBuilder::delegation(Policies::none())
            .audience(holder.did())
            .subject(root.did())
            .command("/nil".parse().unwrap())
            .sign(&root)
            .await
            .unwrap();
        let delegation_hash = delegation.token().hash();

        let invocation =
            NucTokenBuilder::invocation_from(delegation, arguments(json!({"foo": 42})))
                .audience(service.did())
                .command("/nil/db".parse().unwrap())
                .sign(&holder)
                .await
                .unwrap();

        let token = invocation.token().token();
        assert_eq!(token.proofs, vec![delegation_hash]);
        assert_eq!(invocation.proofs().len(), 1);
        assert_eq!(invocation.proofs()[0].hash(), delegation_hash);
        // subject defaulted from the parent
        assert_eq!(token.subject, root.did());
    }

    #[tokio::test]
    async fn test_serialized_envelope_parses_back() {
        let root = signer(1);
        let holder = signer(2);

        let delegation = NucTokenBuilder::delegation(Policies::none())
            .audience(holder.did())
            .subject(root.did())
            .command("/nil".parse().unwrap())
            .sign(&root)
            .await
            .unwrap();
        let invocation =
            NucTokenBuilder::invocation_from(delegation, arguments(json!({"foo": 42})))
                .audience(root.did())
                .command("/nil/db".parse().unwrap())
                .sign(&holder)
                .await
                .unwrap();

        let wire = invocation.serialize();
        let parsed: NucEnvelope = wire.parse().unwrap();
        assert_eq!(parsed, invocation);
        assert_eq!(parsed.token().hash(), invocation.token().hash());
    }

    #[tokio::test]
    async fn test_rejects_issuer_not_parent_audience() {
        let root = signer(1);
        let holder = signer(2);
        let outsider = signer(4);

        let delegation = NucTokenBuilder::delegation(Policies::none())
            .audience(holder.did())
            .subject(root.did())
            .command("/nil".parse().unwrap())
            .sign(&root)
            .await
            .unwrap();

        let result = NucTokenBuilder::invocation_from(delegation, Map::new())
            .audience(root.did())
            .command("/nil/db".parse().unwrap())
            .sign(&outsider)
            .await;
        assert!(matches!(result, Err(BuildError::IssuerMismatch)));
    }

    #[tokio::test]
    async fn test_rejects_widening_command() {
        let root = signer(1);
        let holder = signer(2);

        let delegation = NucTokenBuilder::delegation(Policies::none())
            .audience(holder.did())
            .subject(root.did())
            .command("/nil/db".parse().unwrap())
            .sign(&root)
            .await
            .unwrap();

        let result = NucTokenBuilder::invocation_from(delegation, Map::new())
            .audience(root.did())
            .command("/bar".parse().unwrap())
            .sign(&holder)
            .await;
        assert!(matches!(result, Err(BuildError::CommandNotAttenuated)));
    }

    #[tokio::test]
    async fn test_revoke_escapes_parent_namespace() {
        let root = signer(1);
        let holder = signer(2);

        let delegation = NucTokenBuilder::delegation(Policies::none())
            .audience(holder.did())
            .subject(root.did())
            .command("/nil/db/data".parse().unwrap())
            .sign(&root)
            .await
            .unwrap();

        let result = NucTokenBuilder::invocation_from(
            delegation,
            arguments(json!({"token_hash": "aa".repeat(32)})),
        )
        .audience(root.did())
        .command(REVOKE.clone())
        .sign(&holder)
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_window_escaping_parent() {
        let root = signer(1);
        let holder = signer(2);

        let delegation = NucTokenBuilder::delegation(Policies::none())
            .audience(holder.did())
            .subject(root.did())
            .command("/nil".parse().unwrap())
            .expires_at(UnixTimestamp::from_secs(2_000_000_000))
            .sign(&root)
            .await
            .unwrap();

        let result = NucTokenBuilder::invocation_from(delegation, Map::new())
            .audience(root.did())
            .command("/nil".parse().unwrap())
            .expires_at(UnixTimestamp::from_secs(2_000_000_100))
            .sign(&holder)
            .await;
        assert!(matches!(result, Err(BuildError::InvalidTemporalWindow)));
    }

    #[tokio::test]
    async fn test_explicit_nonce_and_meta() {
        let root = signer(1);
        let envelope = NucTokenBuilder::invocation(Map::new())
            .audience(root.did())
            .subject(root.did())
            .command("/nil".parse().unwrap())
            .nonce([0xaa; 4])
            .meta(arguments(json!({"origin": "test"})))
            .sign(&root)
            .await
            .unwrap();

        let token = envelope.token().token();
        assert_eq!(token.nonce, vec![0xaa; 4]);
        assert_eq!(token.meta.as_ref().unwrap()["origin"], json!("test"));
    }
}
