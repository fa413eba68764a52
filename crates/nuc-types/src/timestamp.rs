//! Unix timestamp utilities for token validity windows.
//!
//! This module provides the [`UnixTimestamp`] type used in NUC payloads to
//! represent the `nbf` (not before) and `exp` (expires at) bounds of a
//! token's validity window.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// A Unix timestamp representing seconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// NUC payloads carry two optional bounds:
///
/// - **`nbf`**: The earliest time the token is valid
/// - **`exp`**: The time at which the token expires
///
/// # Serialization
///
/// Serialized as a plain JSON integer, matching the JWT convention for
/// `nbf`/`exp` claims:
///
/// ```json
/// 1699999999
/// ```
///
/// # Example
///
/// ```
/// use nuc_types::timestamp::UnixTimestamp;
///
/// let ts = UnixTimestamp::from_secs(1699999999);
/// let one_hour_later = ts + 3600;
/// assert_eq!(one_hour_later.as_secs(), 1700003599);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct UnixTimestamp(pub u64);

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0 + rhs)
    }
}

impl From<u64> for UnixTimestamp {
    fn from(value: u64) -> Self {
        UnixTimestamp(value)
    }
}

impl UnixTimestamp {
    /// Creates a timestamp from raw seconds since the Unix epoch.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current wall-clock time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch,
    /// which should never happen on properly configured systems.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    /// Returns the timestamp as raw seconds since the Unix epoch.
    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_integer() {
        let ts = UnixTimestamp::from_secs(1699999999);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "1699999999");
    }

    #[test]
    fn test_deserializes_from_integer() {
        let ts: UnixTimestamp = serde_json::from_str("1699999999").unwrap();
        assert_eq!(ts.as_secs(), 1699999999);
    }

    #[test]
    fn test_ordering() {
        let earlier = UnixTimestamp::from_secs(100);
        let later = UnixTimestamp::from_secs(200);
        assert!(earlier < later);
        assert_eq!(earlier + 100, later);
    }
}
