// Variable-length integers for the patch stream.
//
// Base-128, big-endian: most-significant group first.
// Each byte has bit 7 set except the final byte (the VCDIFF convention).

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

/// Overflow guard: if these bits are set before a shift, the next `<< 7`
/// would overflow.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a `u64` into the tail of `buf`.
/// Returns the number of bytes written (1..=10).
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F;
    MAX_VARINT_LEN - i
}

/// Append `num` to `out`.
pub fn push_usize(out: &mut Vec<u8>, num: usize) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num as u64, &mut buf);
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a `u64` from the front of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

/// Decode a `usize`, rejecting values that do not fit the platform width.
pub fn read_usize(data: &[u8]) -> Result<(usize, usize), VarIntError> {
    let (val, len) = read_u64(data)?;
    let val = usize::try_from(val).map_err(|_| VarIntError::Overflow)?;
    Ok((val, len))
}

/// Encoded byte-length of `num`.
#[inline]
pub fn sizeof_usize(num: usize) -> usize {
    let bits = 64 - (num as u64).leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_VARINT_LEN)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VarIntError {
    /// Not enough input bytes to complete the integer.
    #[error("varint underflow (truncated input)")]
    Underflow,
    /// Value would overflow the target integer type.
    #[error("varint overflow")]
    Overflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_values() {
        let cases: &[usize] = &[0, 1, 127, 128, 255, 256, 16383, 16384, u32::MAX as usize, usize::MAX];
        for &val in cases {
            let mut out = Vec::new();
            push_usize(&mut out, val);
            let (decoded, consumed) = read_usize(&out).unwrap();
            assert_eq!(decoded, val, "roundtrip failed for {val}");
            assert_eq!(consumed, out.len(), "length mismatch for {val}");
            assert_eq!(sizeof_usize(val), out.len(), "sizeof mismatch for {val}");
        }
    }

    #[test]
    fn encoding_is_big_endian() {
        // 300 = 0b100101100 = two groups: (10) (0101100) = 0x82 0x2C
        let mut out = Vec::new();
        push_usize(&mut out, 300);
        assert_eq!(out, [0x82, 0x2C]);
    }

    #[test]
    fn reads_only_first_integer() {
        let (val, len) = read_usize(&[0x05, 0xFF, 0xFF]).unwrap();
        assert_eq!((val, len), (5, 1));
    }

    #[test]
    fn underflow_detection() {
        assert_eq!(read_u64(&[0x80, 0x80, 0x80]), Err(VarIntError::Underflow));
        assert_eq!(read_u64(&[]), Err(VarIntError::Underflow));
    }

    #[test]
    fn overflow_detection() {
        let data = [0xFF; 11];
        assert_eq!(read_u64(&data), Err(VarIntError::Overflow));
    }
}
