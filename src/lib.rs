//! NUC capability tokens in Rust.
//!
//! This crate implements the NUC token format: JWT-like signed envelopes
//! that either **delegate** authority under a policy list or **invoke** it
//! with concrete arguments. Tokens chain back to a trusted root issuer
//! through hash-linked proofs, and a validator checks the whole chain:
//! signatures, linkage, command attenuation, validity windows, structural
//! limits, and policy satisfaction.
//!
//! # Roles
//!
//! - **Issuer**: builds and signs tokens. See [`builder`] for assembly and
//!   [`signer`] for the raw secp256k1 and EIP-712 signing backends.
//! - **Service**: receives serialized envelopes and validates them. See
//!   [`validate`] for the chain validator.
//! - **Holder**: re-delegates received tokens by extending their
//!   envelopes, again through [`builder`].
//!
//! # Modules
//!
//! - [`builder`] — Fluent construction of root and chained tokens.
//! - [`signer`] — The signing seam: local ES256K keys and EIP-712 wallets.
//! - [`validate`] — The chain validator and its parameters.
//! - [`logging`] — `NILLION_LOG_LEVEL`-driven tracing bootstrap.
//! - [`types`] — Re-export of the `nuc-types` wire-level building blocks.
//!
//! # Example
//!
//! ```no_run
//! use k256::ecdsa::SigningKey;
//! use nuc_rs::builder::NucTokenBuilder;
//! use nuc_rs::signer::{NucSigner, Secp256k1Signer};
//! use nuc_rs::validate::{NucValidator, ValidationParameters};
//! use nuc_types::policy::Policies;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let root = Secp256k1Signer::new(SigningKey::from_slice(&[0x11; 32])?);
//! let holder = Secp256k1Signer::new(SigningKey::from_slice(&[0x22; 32])?);
//!
//! // Delegate `/nil/db` to the holder...
//! let delegation = NucTokenBuilder::delegation(Policies::none())
//!     .audience(holder.did())
//!     .subject(root.did())
//!     .command("/nil/db".parse()?)
//!     .expires_in(3600)
//!     .sign(&root)
//!     .await?;
//!
//! // ...who invokes a narrower command.
//! let invocation = NucTokenBuilder::invocation_from(delegation, Default::default())
//!     .audience(root.did())
//!     .command("/nil/db/read".parse()?)
//!     .sign(&holder)
//!     .await?;
//!
//! let validator = NucValidator::new([root.did()], ValidationParameters::default());
//! validator.validate(&invocation.serialize().parse()?, &serde_json::json!({}))?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod logging;
pub mod signer;
pub mod validate;

pub use nuc_types as types;
