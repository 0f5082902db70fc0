//! Packed (LEB128) variable-length unsigned integers.
//!
//! Each byte carries 7 payload bits, low group first; the high bit is set on every byte
//! except the last. Values use the minimal number of bytes, so a sequence of packed
//! integers can be decoded forward without any external length information.

use crate::error::{DedupError, DedupResult};

/// Encode an unsigned integer into `buf`, returning the number of bytes written.
pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) -> usize {
    let start = buf.len();
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
    buf.len() - start
}

/// Number of bytes `encode_varint` would write for `value`.
#[inline]
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Decode an unsigned integer from `buf` starting at `*pos`, advancing `*pos` past it.
pub fn decode_varint(buf: &[u8], pos: &mut usize) -> DedupResult<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let Some(&byte) = buf.get(*pos) else {
            return Err(DedupError::InvalidEntry {
                reason: format!("packed integer truncated at byte {}", *pos),
            });
        };
        *pos += 1;

        let payload = (byte & 0x7F) as u64;
        if shift > 63 || (shift == 63 && payload > 1) {
            return Err(DedupError::InvalidEntry {
                reason: "packed integer overflows 64 bits".to_string(),
            });
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            // A trailing zero group means the value fit in fewer bytes.
            if byte == 0 && shift > 0 {
                return Err(DedupError::InvalidEntry {
                    reason: format!("packed integer not minimally encoded at byte {}", *pos - 1),
                });
            }
            return Ok(result);
        }
        shift += 7;
    }
}
