//! Error types for Cairn
//!
//! Provides a unified error type for all Cairn operations.

use thiserror::Error;

/// Result type alias for Cairn operations
pub type Result<T> = std::result::Result<T, CairnError>;

/// Unified error type for Cairn
#[derive(Error, Debug)]
pub enum CairnError {
    // ===== Integrity Errors =====
    #[error("Integrity failure: expected checksum {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    // ===== Lookup Errors =====
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid checksum {input:?}: {reason}")]
    InvalidChecksum { input: String, reason: String },

    // ===== Peer Errors =====
    #[error("Peer {peer} unavailable: {reason}")]
    UnavailablePeer { peer: String, reason: String },

    #[error("No peers available: {0}")]
    NotAvailable(String),

    // ===== Recovery Errors =====
    #[error("Insufficient redundancy: have {available} shards, need {required}")]
    InsufficientRedundancy { available: usize, required: usize },

    #[error("Unsatisfiable download: no live peer hosts shard {position} ({checksum})")]
    UnsatisfiableDownload { position: usize, checksum: String },

    #[error("Erasure coding error: {0}")]
    ErasureCoding(String),

    // ===== Configuration Errors =====
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ===== Storage Errors =====
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CairnError {
    /// Whether another peer may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CairnError::UnavailablePeer { .. })
    }
}

impl From<reed_solomon_erasure::Error> for CairnError {
    fn from(err: reed_solomon_erasure::Error) -> Self {
        CairnError::ErasureCoding(err.to_string())
    }
}

impl From<bincode::Error> for CairnError {
    fn from(err: bincode::Error) -> Self {
        CairnError::Serialization(err.to_string())
    }
}
