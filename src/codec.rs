// src/codec.rs
use ethers::types::U256;

use crate::error::{Result, UserOpError};

/// Packs two 128-bit values into one 32-byte word as `(high << 128) | low`.
pub fn pack_uint128_pair(high: U256, low: U256) -> Result<[u8; 32]> {
    if high.bits() > 128 {
        return Err(UserOpError::Range(format!("high half {high:#x}")));
    }
    if low.bits() > 128 {
        return Err(UserOpError::Range(format!("low half {low:#x}")));
    }

    let packed = (high << 128usize) | low;
    let mut word = [0u8; 32];
    packed.to_big_endian(&mut word);
    Ok(word)
}

/// Left-pads `bytes` with zeros up to `length`. Longer input is an error, never truncated.
pub fn left_pad(bytes: &[u8], length: usize) -> Result<Vec<u8>> {
    if bytes.len() > length {
        return Err(UserOpError::Padding {
            actual: bytes.len(),
            target: length,
        });
    }

    let mut padded = vec![0u8; length - bytes.len()];
    padded.extend_from_slice(bytes);
    Ok(padded)
}
