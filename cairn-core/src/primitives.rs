//! Byte primitives shared by sharding and parity.

use crate::error::{CairnError, Result};

/// Extend `data` with null bytes up to `width`. Longer input is left alone.
pub fn pad(data: &[u8], width: usize) -> Vec<u8> {
    let mut padded = data.to_vec();
    if padded.len() < width {
        padded.resize(width, 0);
    }
    padded
}

/// Truncate padded bytes back to their original length.
pub fn unpad(mut data: Vec<u8>, original_len: usize) -> Result<Vec<u8>> {
    if data.len() < original_len {
        return Err(CairnError::InvalidConfig(format!(
            "cannot unpad {} bytes to {}",
            data.len(),
            original_len
        )));
    }
    data.truncate(original_len);
    Ok(data)
}

/// XOR equal-length byte strings together.
pub fn xor<T: AsRef<[u8]>>(parts: &[T]) -> Result<Vec<u8>> {
    let width = parts.first().map(|p| p.as_ref().len()).unwrap_or(0);
    let mut acc = vec![0u8; width];
    for part in parts {
        let part = part.as_ref();
        if part.len() != width {
            return Err(CairnError::InvalidConfig(format!(
                "xor over unequal lengths: {} vs {}",
                width,
                part.len()
            )));
        }
        for (a, b) in acc.iter_mut().zip(part) {
            *a ^= b;
        }
    }
    Ok(acc)
}

/// Concatenate byte strings in order.
pub fn concat<T: AsRef<[u8]>>(parts: &[T]) -> Vec<u8> {
    let total = parts.iter().map(|p| p.as_ref().len()).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(part.as_ref());
    }
    out
}
