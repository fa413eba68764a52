//! End-to-end validation of proof chains.
//!
//! The validator takes a parsed [`NucEnvelope`] and checks everything
//! needed to accept its main token: the proof pool must link into a
//! single chain rooted at a trusted issuer, every signature must verify,
//! authority must only narrow along the chain, every token must be inside
//! its validity window, and every delegation policy must hold against the
//! invocation. Validation is pure computation over the inputs; the only
//! ambient dependency, the clock, is injected through [`TimeProvider`].

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

use nuc_types::command::REVOKE;
use nuc_types::did::Did;
use nuc_types::envelope::{NucEnvelope, SignedNuc};
use nuc_types::timestamp::UnixTimestamp;
use nuc_types::token::{ProofHash, TokenBody};

mod signature;

pub use signature::verify_signature;

/// Reasons an envelope can fail validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A token names a proof hash that is not in the pool.
    #[error("proof {0} is missing from the proof pool")]
    MissingProof(ProofHash),
    /// The pool contains proofs the chain never reaches.
    #[error("proofs in the pool are not part of the chain")]
    UnchainedProofs,
    /// The proof links loop instead of terminating at a root.
    #[error("proof chain contains a cycle")]
    ProofChainCycle,
    /// The chain is longer than the configured maximum.
    #[error("proof chain is too long")]
    ChainTooLong,
    /// The chain's terminal issuer is not a trusted root.
    #[error("chain is not rooted in a trusted issuer key")]
    RootKeySignatureMissing,
    /// A token's signature does not verify against its issuer.
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    /// A token's issuer method cannot produce its header's signature kind.
    #[error("issuer DID method does not match the token header")]
    IssuerMethodMismatch,
    /// A proof token is an invocation.
    #[error("every proof must be a delegation")]
    NotADelegation,
    /// The main token's audience does not match the requirement.
    #[error("main token audience does not match")]
    InvalidAudience,
    /// A delegation was required but the main token is an invocation.
    #[error("main token must be a delegation")]
    NeedDelegation,
    /// An invocation was required but the main token is a delegation.
    #[error("main token must be an invocation")]
    NeedInvocation,
    /// A token's issuer is not its proof's audience.
    #[error("token issuer does not match the proof audience")]
    IssuerAudienceMismatch,
    /// The subject changes along the chain.
    #[error("tokens in the chain have different subjects")]
    DifferentSubjects,
    /// A token's command does not narrow its proof's command.
    #[error("token command is not an attenuation of the proof command")]
    CommandNotAttenuated,
    /// A token's validity window escapes its proof's window.
    #[error("token validity window exceeds the proof window")]
    InvalidTemporalWindow,
    /// A token's `nbf` is in the future.
    #[error("token is not yet valid")]
    NotYetValid,
    /// A token's `exp` has passed.
    #[error("token is expired")]
    Expired,
    /// A delegation policy nests deeper than the configured maximum.
    #[error("policy is too deep")]
    PolicyTooDeep,
    /// A delegation policy fans out wider than the configured maximum.
    #[error("policy is too wide")]
    PolicyTooWide,
    /// A delegation policy evaluates to false for the invocation.
    #[error("policy is not met")]
    PolicyNotMet,
}

/// What the main token must be for validation to succeed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TokenTypeRequirements {
    /// The main token must be an invocation addressed to the given party.
    Invocation(Did),
    /// The main token must be a delegation addressed to the given party.
    Delegation(Did),
    /// No requirement on the main token.
    #[default]
    None,
}

/// Tunable limits and requirements for chain validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationParameters {
    /// Maximum number of tokens in the chain, main token included.
    pub max_chain_length: usize,
    /// Maximum connector fan-out in any delegation policy.
    pub max_policy_width: usize,
    /// Maximum nesting depth in any delegation policy.
    pub max_policy_depth: usize,
    /// Requirement on the main token's kind and audience.
    pub token_requirements: TokenTypeRequirements,
}

impl Default for ValidationParameters {
    fn default() -> Self {
        Self {
            max_chain_length: 5,
            max_policy_width: 10,
            max_policy_depth: 5,
            token_requirements: TokenTypeRequirements::None,
        }
    }
}

/// A source of "now" for temporal checks.
///
/// Inject a fixed clock in tests; production uses [`SystemClock`].
pub trait TimeProvider: Send + Sync {
    /// The current time in Unix seconds.
    fn current_time(&self) -> UnixTimestamp;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeProvider for SystemClock {
    fn current_time(&self) -> UnixTimestamp {
        UnixTimestamp::now()
    }
}

/// Validates envelopes against a set of trusted root issuers.
///
/// The validator is stateless between calls and safe to share across
/// threads.
///
/// # Example
///
/// ```no_run
/// use nuc_rs::validate::{NucValidator, ValidationParameters};
/// use nuc_types::envelope::NucEnvelope;
///
/// # fn example(root: nuc_types::did::Did, envelope: NucEnvelope) {
/// let validator = NucValidator::new([root], ValidationParameters::default());
/// let token = validator.validate(&envelope, &serde_json::json!({})).unwrap();
/// println!("validated {}", token.token().command);
/// # }
/// ```
pub struct NucValidator {
    root_issuers: HashSet<Did>,
    parameters: ValidationParameters,
    time_provider: Box<dyn TimeProvider>,
}

impl NucValidator {
    /// Creates a validator trusting the given root issuers, using the
    /// wall clock.
    pub fn new<I: IntoIterator<Item = Did>>(
        root_issuers: I,
        parameters: ValidationParameters,
    ) -> Self {
        Self {
            root_issuers: root_issuers.into_iter().collect(),
            parameters,
            time_provider: Box::new(SystemClock),
        }
    }

    /// Replaces the clock, typically with a fixed one in tests.
    pub fn with_time_provider<T: TimeProvider + 'static>(mut self, time_provider: T) -> Self {
        self.time_provider = Box::new(time_provider);
        self
    }

    /// Runs every check against the envelope and returns the validated
    /// main token.
    ///
    /// `context` is the object `$`-selectors in delegation policies
    /// resolve against; pass an empty object when there is none.
    #[instrument(skip_all, err, fields(command = %envelope.token().token().command))]
    pub fn validate<'a>(
        &self,
        envelope: &'a NucEnvelope,
        context: &Value,
    ) -> Result<&'a SignedNuc, ValidationError> {
        let chain = assemble_chain(envelope)?;

        if chain.len() > self.parameters.max_chain_length {
            return Err(ValidationError::ChainTooLong);
        }

        let root = chain.last().expect("chain contains the main token");
        if !self.root_issuers.contains(&root.token().issuer) {
            return Err(ValidationError::RootKeySignatureMissing);
        }

        for nuc in &chain {
            verify_signature(nuc)?;
        }

        for proof in &chain[1..] {
            if !proof.token().is_delegation() {
                return Err(ValidationError::NotADelegation);
            }
        }
        self.check_token_requirements(envelope.token())?;

        for pair in chain.windows(2) {
            check_linkage(pair[0].token(), pair[1].token())?;
        }

        let now = self.time_provider.current_time();
        for nuc in &chain {
            check_temporal_validity(nuc.token(), now)?;
        }

        for nuc in &chain {
            if let TokenBody::Delegation(policies) = &nuc.token().body {
                let properties = policies.properties();
                if properties.max_depth > self.parameters.max_policy_depth {
                    return Err(ValidationError::PolicyTooDeep);
                }
                if properties.max_width > self.parameters.max_policy_width {
                    return Err(ValidationError::PolicyTooWide);
                }
            }
        }

        if envelope.token().token().is_invocation() {
            let invocation = envelope.token().token().to_json();
            for proof in &chain[1..] {
                if let TokenBody::Delegation(policies) = &proof.token().body
                    && !policies.evaluate(&invocation, context)
                {
                    return Err(ValidationError::PolicyNotMet);
                }
            }
        }

        Ok(envelope.token())
    }

    fn check_token_requirements(&self, main: &SignedNuc) -> Result<(), ValidationError> {
        match &self.parameters.token_requirements {
            TokenTypeRequirements::Invocation(audience) => {
                if !main.token().is_invocation() {
                    return Err(ValidationError::NeedInvocation);
                }
                if &main.token().audience != audience {
                    return Err(ValidationError::InvalidAudience);
                }
            }
            TokenTypeRequirements::Delegation(audience) => {
                if !main.token().is_delegation() {
                    return Err(ValidationError::NeedDelegation);
                }
                if &main.token().audience != audience {
                    return Err(ValidationError::InvalidAudience);
                }
            }
            TokenTypeRequirements::None => {}
        }
        Ok(())
    }
}

/// Rebuilds the linear chain from the proof pool: main token first, root
/// last. Duplicate pool entries are deduplicated by hash (first wins);
/// pool entries the chain never reaches are rejected.
fn assemble_chain(envelope: &NucEnvelope) -> Result<Vec<&SignedNuc>, ValidationError> {
    let mut pool: HashMap<ProofHash, &SignedNuc> = HashMap::new();
    for proof in envelope.proofs() {
        pool.entry(proof.hash()).or_insert(proof);
    }

    let mut chain = vec![envelope.token()];
    let mut reached = HashSet::new();
    let mut current = envelope.token();
    while let Some(parent_hash) = current.token().proofs.first().copied() {
        if !reached.insert(parent_hash) {
            return Err(ValidationError::ProofChainCycle);
        }
        let parent = *pool
            .get(&parent_hash)
            .ok_or(ValidationError::MissingProof(parent_hash))?;
        chain.push(parent);
        current = parent;
    }

    if reached.len() != pool.len() {
        return Err(ValidationError::UnchainedProofs);
    }
    Ok(chain)
}

fn check_linkage(
    child: &nuc_types::token::NucToken,
    parent: &nuc_types::token::NucToken,
) -> Result<(), ValidationError> {
    if child.issuer != parent.audience {
        return Err(ValidationError::IssuerAudienceMismatch);
    }
    if child.subject != parent.subject {
        return Err(ValidationError::DifferentSubjects);
    }
    if child.command != *REVOKE && !child.command.is_attenuation_of(&parent.command) {
        return Err(ValidationError::CommandNotAttenuated);
    }
    if let (Some(child_nbf), Some(parent_nbf)) = (child.not_before, parent.not_before)
        && child_nbf < parent_nbf
    {
        return Err(ValidationError::InvalidTemporalWindow);
    }
    if let (Some(child_exp), Some(parent_exp)) = (child.expires_at, parent.expires_at)
        && child_exp > parent_exp
    {
        return Err(ValidationError::InvalidTemporalWindow);
    }
    Ok(())
}

fn check_temporal_validity(
    token: &nuc_types::token::NucToken,
    now: UnixTimestamp,
) -> Result<(), ValidationError> {
    if let Some(not_before) = token.not_before
        && now < not_before
    {
        return Err(ValidationError::NotYetValid);
    }
    if let Some(expires_at) = token.expires_at
        && now >= expires_at
    {
        return Err(ValidationError::Expired);
    }
    Ok(())
}
