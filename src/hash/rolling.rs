// Token hashing and byte comparison primitives.
//
// Tokens are fixed-width windows hashed with a polynomial (Rabin-Karp style)
// checksum over u64 wrapping arithmetic:
//
//     h(x0..xk) = x0*M^k + x1*M^(k-1) + ... + x(k-1)*M
//
// which supports O(1) sliding: subtract the outgoing byte times M^k, add the
// incoming byte, multiply by M.  The checksum is only ever a hash key; equal
// checksums are candidates, and byte equality is established by the
// comparators below.

/// Multiplier of the token polynomial (odd, so it is invertible mod 2^64).
pub const TOKEN_HASH_MULT: u64 = 0x0000_0100_0000_01B3;

/// Offset added to every byte so that runs of zero bytes hash to non-zero.
const BYTE_OFFSET: u64 = 1;

/// Rolling checksum state for one token width.
#[derive(Debug, Clone, Copy)]
pub struct TokenHash {
    /// Token width in bytes.
    pub look: usize,
    /// `M^look`, coefficient of the outgoing byte.
    out_coefficient: u64,
}

impl TokenHash {
    pub fn new(look: usize) -> Self {
        debug_assert!(look > 0);
        Self {
            look,
            out_coefficient: pow_wrapping(TOKEN_HASH_MULT, look),
        }
    }

    /// Full checksum of the token starting at `base[0]`.
    #[inline]
    pub fn checksum(&self, base: &[u8]) -> u64 {
        debug_assert!(base.len() >= self.look);
        base[..self.look].iter().fold(0u64, |acc, &b| {
            acc.wrapping_add(u64::from(b) + BYTE_OFFSET)
                .wrapping_mul(TOKEN_HASH_MULT)
        })
    }

    /// Slide the window one byte: drop `out`, append `inp`.
    #[inline(always)]
    pub fn update(&self, old: u64, out: u8, inp: u8) -> u64 {
        old.wrapping_sub((u64::from(out) + BYTE_OFFSET).wrapping_mul(self.out_coefficient))
            .wrapping_add(u64::from(inp) + BYTE_OFFSET)
            .wrapping_mul(TOKEN_HASH_MULT)
    }
}

fn pow_wrapping(mut base: u64, mut exp: usize) -> u64 {
    let mut acc = 1u64;
    while exp > 0 {
        if exp & 1 == 1 {
            acc = acc.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exp >>= 1;
    }
    acc
}

// ---------------------------------------------------------------------------
// Byte comparators
// ---------------------------------------------------------------------------

const CHUNK: usize = 8;

/// Number of equal leading bytes of `s1` and `s2`, at most `n`.
#[inline]
pub fn forward_match(s1: &[u8], s2: &[u8], n: usize) -> usize {
    let n = n.min(s1.len()).min(s2.len());
    let mut i = 0;
    // Word-sized strides first, then byte by byte inside the first
    // differing word.
    while i + CHUNK <= n && s1[i..i + CHUNK] == s2[i..i + CHUNK] {
        i += CHUNK;
    }
    while i < n && s1[i] == s2[i] {
        i += 1;
    }
    i
}

/// Number of equal trailing bytes of `s1` and `s2`, at most `n`.
#[inline]
pub fn backward_match(s1: &[u8], s2: &[u8], n: usize) -> usize {
    let n = n.min(s1.len()).min(s2.len());
    let (l1, l2) = (s1.len(), s2.len());
    let mut i = 0;
    while i + CHUNK <= n && s1[l1 - i - CHUNK..l1 - i] == s2[l2 - i - CHUNK..l2 - i] {
        i += CHUNK;
    }
    while i < n && s1[l1 - i - 1] == s2[l2 - i - 1] {
        i += 1;
    }
    i
}
