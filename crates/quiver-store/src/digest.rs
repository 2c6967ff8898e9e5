//! Content digests.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

use crate::error::StoreError;

/// A content digest in the form `sha256:<64 hex chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    /// Compute the digest of an artifact body.
    pub fn of(body: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        Self(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    /// Parse a digest string, validating the format.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        let hex_part = s
            .strip_prefix("sha256:")
            .ok_or_else(|| StoreError::InvalidDigest(s.to_string()))?;
        if hex_part.len() != 64 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidDigest(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..std::cmp::min(23, self.0.len())]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = Digest::of("SELECT 1");
        let b = Digest::of("SELECT 1");
        assert_eq!(a, b);
        assert_ne!(a, Digest::of("SELECT 2"));
    }

    #[test]
    fn digest_format() {
        let d = Digest::of("hello");
        assert!(d.as_str().starts_with("sha256:"));
        assert_eq!(d.as_str().len(), 71);
        Digest::parse(d.as_str()).unwrap();
    }

    #[test]
    fn parse_rejects_bad_formats() {
        assert!(Digest::parse("md5:abcd").is_err());
        assert!(Digest::parse("sha256:zzzz").is_err());
        assert!(Digest::parse("sha256:").is_err());
    }
}
