//! Reed-Solomon erasure coding
//!
//! The byte stream is cut into fixed-size codewords. Each codeword carries
//! `j` message pieces and `k - j` parity pieces of `w = ceil(255 / k)`
//! bytes, so roughly `ceil((k - j) / k * 255)` of its 255-odd symbols are
//! error tolerance. Shard `i` is piece `i` of every codeword laid end to
//! end, which spreads parity evenly over the `k` shards: any `j` of them
//! decode the whole stream.

use super::{sample_positions, Redundancy};
use crate::block::Block;
use crate::error::{CairnError, Result};
use crate::primitives::{concat, pad, unpad};
use crate::shard::ShardSet;
use bytes::Bytes;
use rand::RngCore;
use rayon::prelude::*;
use reed_solomon_erasure::galois_8::ReedSolomon;
use tracing::debug;

/// Nominal codeword size in GF(2^8) symbols
pub const RS_BLOCK_SIZE: usize = 255;

/// Reed-Solomon codec producing `shards` outputs, any `minimum` of which decode
pub struct ReedSolomonCodec {
    shards: usize,
    minimum: usize,
    symbol_width: usize,
    encoder: ReedSolomon,
}

impl std::fmt::Debug for ReedSolomonCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReedSolomonCodec")
            .field("shards", &self.shards)
            .field("minimum", &self.minimum)
            .field("symbol_width", &self.symbol_width)
            .finish()
    }
}

impl ReedSolomonCodec {
    /// Create a codec with `k` shards of which any `j` suffice
    pub fn new(k: usize, j: usize) -> Result<Self> {
        if j == 0 {
            return Err(CairnError::InvalidConfig(
                "minimum shard count must be > 0".to_string(),
            ));
        }
        if j >= k {
            return Err(CairnError::InvalidConfig(format!(
                "minimum shard count {} must be below shard count {}",
                j, k
            )));
        }
        if k > RS_BLOCK_SIZE {
            return Err(CairnError::InvalidConfig(format!(
                "at most {} shards per codeword, got {}",
                RS_BLOCK_SIZE, k
            )));
        }

        let encoder = ReedSolomon::new(j, k - j)?;
        Ok(Self {
            shards: k,
            minimum: j,
            symbol_width: RS_BLOCK_SIZE.div_ceil(k),
            encoder,
        })
    }

    /// Bytes each shard contributes to one codeword
    pub fn symbol_width(&self) -> usize {
        self.symbol_width
    }

    /// Message bytes carried per codeword
    pub fn message_len(&self) -> usize {
        self.minimum * self.symbol_width
    }

    /// Encode a byte stream into `k` interleaved shards
    pub fn encode(&self, data: &[u8]) -> Result<Vec<Block>> {
        let message_len = self.message_len();
        let codewords = data.len().div_ceil(message_len).max(1);

        let encoded: Vec<Vec<Vec<u8>>> = (0..codewords)
            .into_par_iter()
            .map(|c| -> Result<Vec<Vec<u8>>> {
                let start = (c * message_len).min(data.len());
                let end = ((c + 1) * message_len).min(data.len());
                let message = pad(&data[start..end], message_len);

                let mut pieces: Vec<Vec<u8>> = message
                    .chunks(self.symbol_width)
                    .map(|p| p.to_vec())
                    .collect();
                pieces.resize(self.shards, vec![0u8; self.symbol_width]);

                self.encoder.encode(&mut pieces)?;
                Ok(pieces)
            })
            .collect::<Result<_>>()?;

        // Transpose: shard i takes piece i of every codeword
        let shards = (0..self.shards)
            .map(|i| {
                let mut shard = Vec::with_capacity(codewords * self.symbol_width);
                for codeword in &encoded {
                    shard.extend_from_slice(&codeword[i]);
                }
                Block::new(shard)
            })
            .collect();

        debug!(
            codewords,
            shards = self.shards,
            minimum = self.minimum,
            "Reed-Solomon encoded stream"
        );
        Ok(shards)
    }

    /// Decode the stream from any `j` shards identified by position
    pub fn decode(&self, slots: &[Option<Block>], original_len: usize) -> Result<Bytes> {
        if slots.len() != self.shards {
            return Err(CairnError::InvalidConfig(format!(
                "expected {} shards, got layout of {}",
                self.shards,
                slots.len()
            )));
        }

        let available = slots.iter().filter(|s| s.is_some()).count();
        if available < self.minimum {
            return Err(CairnError::InsufficientRedundancy {
                available,
                required: self.minimum,
            });
        }

        let width = slots
            .iter()
            .flatten()
            .map(Block::len)
            .next()
            .unwrap_or(0);
        if width == 0
            || width % self.symbol_width != 0
            || slots.iter().flatten().any(|s| s.len() != width)
        {
            return Err(CairnError::ErasureCoding(format!(
                "shard width {} does not fit codewords of {}",
                width, self.symbol_width
            )));
        }
        let codewords = width / self.symbol_width;
        let w = self.symbol_width;

        // Missing shards become erasures in every codeword
        let decoded: Vec<Vec<u8>> = (0..codewords)
            .into_par_iter()
            .map(|c| -> Result<Vec<u8>> {
                let mut masked: Vec<Option<Vec<u8>>> = slots
                    .iter()
                    .map(|s| s.as_ref().map(|b| b.data()[c * w..(c + 1) * w].to_vec()))
                    .collect();

                self.encoder.reconstruct_data(&mut masked)?;

                let message: Vec<Vec<u8>> = masked
                    .into_iter()
                    .take(self.minimum)
                    .collect::<Option<_>>()
                    .ok_or_else(|| {
                        CairnError::ErasureCoding(format!("codeword {} not reconstructed", c))
                    })?;
                Ok(concat(&message))
            })
            .collect::<Result<_>>()?;

        Ok(Bytes::from(unpad(concat(&decoded), original_len)?))
    }
}

impl Redundancy for ReedSolomonCodec {
    fn name(&self) -> &'static str {
        "reed-solomon"
    }

    /// Treats the incoming shards as one stream and carves its own
    fn introduce_redundancy(&self, shards: Vec<Block>) -> Result<Vec<Block>> {
        let payloads: Vec<&[u8]> = shards.iter().map(|s| s.data().as_ref()).collect();
        self.encode(&concat(&payloads))
    }

    fn is_recovery(&self, position: usize, _total: usize) -> bool {
        position >= self.minimum
    }

    fn minimum_shards(&self, _total: usize) -> usize {
        self.minimum
    }

    fn sample(&self, total: usize, rng: &mut dyn RngCore) -> Vec<usize> {
        sample_positions(total, self.minimum, rng)
    }

    fn recover(&self, shards: ShardSet, original_len: usize) -> Result<Bytes> {
        let slots = shards.into_slots();
        let bytes = self.decode(&slots, original_len)?;
        debug!(len = bytes.len(), "Recovered block using Reed-Solomon");
        Ok(bytes)
    }
}
