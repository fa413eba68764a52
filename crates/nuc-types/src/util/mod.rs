//! Helper types shared across the crate.

mod b64;

pub use b64::Base64UrlBytes;
