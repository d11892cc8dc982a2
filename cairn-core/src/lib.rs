//! Cairn Core Library
//!
//! Core abstractions for the Cairn peer-to-peer block storage engine.
//! This crate provides:
//! - Content-addressed blocks and their metadata (BLAKE3 checksums)
//! - Deterministic sharding and fusion
//! - Redundancy codecs: replication, XOR parity, Reed-Solomon
//! - Round-robin striping and download itinerary planning
//! - Common error handling

pub mod block;
pub mod checksum;
pub mod error;
pub mod primitives;
pub mod redundancy;
pub mod shard;
pub mod striping;

pub use block::{Block, BlockMetadata};
pub use checksum::{checksum, Checksum};
pub use error::{CairnError, Result};
pub use redundancy::Redundancy;
pub use shard::{fuse, shard, ShardSet};
pub use striping::{allocate, download_itinerary, Need};
