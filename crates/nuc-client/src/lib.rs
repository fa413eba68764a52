//! Client-side collaborators for NUC capability tokens.
//!
//! The core token library (`nuc-rs`) is purely computational; this crate
//! holds the pieces that talk to the outside world:
//!
//! - [`client`] — The [`NilauthClient`](client::NilauthClient) for the
//!   nilauth authorization server: minting root tokens, subscription
//!   payments, and revocations over its JSON HTTP API.
//! - [`payer`] — The [`Payer`](payer::Payer) seam for broadcasting
//!   nilchain payment transactions, host-provided.
//!
//! Network calls use a single per-request deadline (10 seconds by
//! default) and never retry on their own.

pub mod client;
pub mod payer;
