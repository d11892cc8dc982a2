//! Content addressing
//!
//! Every block is identified by the BLAKE3 digest of its bytes. Two blocks
//! with equal bytes share a checksum and are treated as the same block.

use crate::error::{CairnError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Inputs at least this large are hashed across the rayon pool
const PARALLEL_THRESHOLD: usize = 1024 * 1024;

/// BLAKE3 digest used as block identity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Compute the checksum of some bytes
    pub fn compute(data: &[u8]) -> Self {
        if data.len() < PARALLEL_THRESHOLD {
            return Self(*blake3::hash(data).as_bytes());
        }
        let mut hasher = blake3::Hasher::new();
        hasher.update_rayon(data);
        Self(*hasher.finalize().as_bytes())
    }

    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Parse from hex
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hash = blake3::Hash::from_hex(hex)
            .map_err(|e| CairnError::InvalidChecksum {
                input: hex.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self(*hash.as_bytes()))
    }

    /// Verify that data matches this checksum
    pub fn verify(&self, data: &[u8]) -> Result<()> {
        let actual = Self::compute(data);
        if &actual != self {
            return Err(CairnError::Integrity {
                expected: self.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }
}

/// Compute the checksum of some bytes
pub fn checksum(data: &[u8]) -> Checksum {
    Checksum::compute(data)
}

impl FromStr for Checksum {
    type Err = CairnError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        assert_eq!(checksum(b"hi"), checksum(b"hi"));
        assert_ne!(checksum(b"hi"), checksum(b"ho"));
    }

    #[test]
    fn test_large_input_matches_plain_digest() {
        let data = vec![7u8; 3 * PARALLEL_THRESHOLD];
        assert_eq!(Checksum::compute(&data).as_bytes(), blake3::hash(&data).as_bytes());
    }

    #[test]
    fn test_hex_roundtrip() {
        let c = checksum(b"hello world");
        let hex = c.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex.parse::<Checksum>().unwrap(), c);
        assert!(matches!(
            "not-hex".parse::<Checksum>(),
            Err(CairnError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn test_verify_mismatch_is_integrity_error() {
        let c = checksum(b"original");
        assert!(c.verify(b"original").is_ok());
        assert!(matches!(
            c.verify(b"tampered"),
            Err(CairnError::Integrity { .. })
        ));
    }
}
