//! Variable-length integer encoding.
//!
//! Seven payload bits per byte, least significant group first, with the high bit
//! marking a continuation. This is the VInt/VLong layout used by the sparse
//! postings and terms files.

use crate::error::{IrisError, Result};

/// Maximum encoded length of a u64.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the encoding of `value` to `out`, returning the number of bytes written.
pub fn encode_u64_into(value: u64, out: &mut Vec<u8>) -> usize {
    let start = out.len();
    let mut val = value;

    while val >= 0x80 {
        out.push((val as u8 & 0x7F) | 0x80);
        val >>= 7;
    }
    out.push(val as u8);

    out.len() - start
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    encode_u64_into(value, &mut bytes);
    bytes
}

/// Encode a u32 value. Document ids and token ids are written this way.
pub fn encode_u32(value: u32) -> Vec<u8> {
    encode_u64(value as u64)
}

/// Decode a u64 value, returning it along with the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 || (shift == 63 && byte > 1) {
            return Err(IrisError::corrupt("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Ok((result, i + 1));
        }

        shift += 7;
    }

    Err(IrisError::corrupt("Incomplete VarInt"))
}

/// Decode a value that must fit in a u32.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, read) = decode_u64(bytes)?;
    let value = u32::try_from(value)
        .map_err(|_| IrisError::corrupt(format!("VarInt {value} does not fit in 32 bits")))?;
    Ok((value, read))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_boundary() {
        assert_eq!(encode_u64(0), vec![0x00]);
        assert_eq!(encode_u64(127), vec![0x7F]);
        assert_eq!(encode_u64(128), vec![0x80, 0x01]);
        assert_eq!(encode_u64(300), vec![0xAC, 0x02]);
    }

    #[test]
    fn test_decode_reports_consumed_bytes() {
        let mut buf = encode_u64(16384);
        buf.extend_from_slice(&[0xFF, 0xFF]);
        let (value, read) = decode_u64(&buf).unwrap();
        assert_eq!(value, 16384);
        assert_eq!(read, 3);
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = vec![9u8];
        let written = encode_u64_into(u64::MAX, &mut buf);
        assert_eq!(written, MAX_VARINT_LEN);
        assert_eq!(buf.len(), 1 + MAX_VARINT_LEN);
        assert_eq!(decode_u64(&buf[1..]).unwrap().0, u64::MAX);
    }

    #[test]
    fn test_incomplete_varint() {
        assert!(decode_u64(&[0x80]).is_err());
        assert!(decode_u64(&[]).is_err());
    }

    #[test]
    fn test_overflow() {
        assert!(decode_u64(&[0xFF; 20]).is_err());
    }

    #[test]
    fn test_decode_u32_rejects_wide_values() {
        let wide = encode_u64(u32::MAX as u64 + 1);
        assert!(decode_u32(&wide).is_err());
        let (v, _) = decode_u32(&encode_u32(70000)).unwrap();
        assert_eq!(v, 70000);
    }
}
