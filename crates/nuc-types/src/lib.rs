#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for NUC capability tokens.
//!
//! This crate provides the wire-level building blocks used throughout the
//! NUC ecosystem: identifiers, command paths, the policy language, token
//! payloads, and the envelope codec. It is purely computational and holds
//! no I/O; signing and validation live in the `nuc-rs` crate.
//!
//! # Overview
//!
//! A NUC is a JWT-like signed token that either **delegates** authority
//! under a list of policies or **invokes** it with concrete arguments.
//! Tokens link to the tokens they extend by hash, forming a proof chain
//! back to a trusted root issuer.
//!
//! # Modules
//!
//! - [`did`] - Decentralized identifiers (`nil`, `key`, `ethr` methods)
//! - [`command`] - Hierarchical command paths and the attenuation rule
//! - [`selector`] - Path expressions over token payloads and context
//! - [`policy`] - The policy expression language attached to delegations
//! - [`token`] - The decoded token payload
//! - [`envelope`] - JWT-style framing, proof serialization, and hashing
//! - [`timestamp`] - Unix timestamps for validity windows
//! - [`util`] - Base64url helpers

pub mod command;
pub mod did;
pub mod envelope;
pub mod policy;
pub mod selector;
pub mod timestamp;
pub mod token;
pub mod util;
