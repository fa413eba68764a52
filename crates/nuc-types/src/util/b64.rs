//! Base64url encoding and decoding utilities.
//!
//! NUC envelopes use the URL-safe base64 alphabet without padding
//! (RFC 4648 §5), matching JWT compact serialization. This module provides
//! [`Base64UrlBytes`], a wrapper type for moving between raw bytes and
//! their base64url text form.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as b64url;
use std::borrow::Cow;
use std::fmt::Display;

/// A wrapper for base64url-encoded byte data.
///
/// This type holds bytes that represent base64url-encoded text and provides
/// methods for encoding and decoding. It uses copy-on-write semantics
/// to avoid unnecessary allocations.
///
/// # Example
///
/// ```rust
/// use nuc_types::util::Base64UrlBytes;
///
/// // Encode some data
/// let encoded = Base64UrlBytes::encode(b"hello world");
/// assert_eq!(encoded.to_string(), "aGVsbG8gd29ybGQ");
///
/// // Decode it back
/// let decoded = encoded.decode().unwrap();
/// assert_eq!(decoded, b"hello world");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64UrlBytes<'a>(pub Cow<'a, [u8]>);

impl Base64UrlBytes<'_> {
    /// Decodes the base64url string bytes to raw binary data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid unpadded base64url.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64url.decode(&self.0)
    }

    /// Encodes raw binary data into base64url string bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64UrlBytes<'static> {
        let encoded = b64url.encode(input.as_ref());
        Base64UrlBytes(Cow::Owned(encoded.into_bytes()))
    }
}

impl AsRef<[u8]> for Base64UrlBytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl<'a> From<&'a [u8]> for Base64UrlBytes<'a> {
    fn from(slice: &'a [u8]) -> Self {
        Base64UrlBytes(Cow::Borrowed(slice))
    }
}

impl<'a> From<&'a str> for Base64UrlBytes<'a> {
    fn from(s: &'a str) -> Self {
        Base64UrlBytes(Cow::Borrowed(s.as_bytes()))
    }
}

impl Display for Base64UrlBytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_unpadded() {
        let encoded = Base64UrlBytes::encode(b"a");
        assert_eq!(encoded.to_string(), "YQ");
    }

    #[test]
    fn test_url_safe_alphabet() {
        // 0xfb 0xff encodes to characters outside the standard alphabet
        let encoded = Base64UrlBytes::encode([0xfbu8, 0xff]);
        assert_eq!(encoded.to_string(), "-_8");
        assert_eq!(encoded.decode().unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_decode_rejects_padding() {
        let padded = Base64UrlBytes::from("YQ==");
        assert!(padded.decode().is_err());
    }
}
