// Token index for one pass.
//
// Maps token checksum -> every indexed position in one or more source
// ranges.  The layout is a bucket offset array plus a flat entry array
// grouped by bucket (counting sort), so building is two allocations and
// O(range / step).
//
// Within a bucket, entries are stored in ascending position order.  That
// lets a lookup start at any position with a binary search and wrap around
// to the lower positions afterwards; candidate order (and therefore
// tie-breaking) depends only on buffer contents and that start position.

use std::ops::Range;

use super::rolling::TokenHash;

/// Smallest bucket array, in bits.
const MIN_BITS: u32 = 4;

/// Largest bucket array, in bits.
const MAX_BITS: u32 = 30;

/// Fibonacci hashing multiplier used to spread checksums over buckets.
const BUCKET_MULT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Copy)]
struct Entry {
    cksum: u64,
    pos: usize,
}

/// Token checksum -> positions table over sub-ranges of a buffer.
#[derive(Debug)]
pub struct MatchIndex {
    /// `starts[b]..starts[b + 1]` is bucket `b`'s slice of `entries`.
    starts: Vec<usize>,
    entries: Vec<Entry>,
    shift: u32,
}

impl MatchIndex {
    /// Index every token of `data[range]` whose start lies at
    /// `range.start + i * step`.
    ///
    /// Tokens must fit entirely inside `range`.
    pub fn build(data: &[u8], range: Range<usize>, hasher: &TokenHash, step: usize) -> Self {
        Self::build_ranges(data, std::slice::from_ref(&range), hasher, step)
    }

    /// Index several disjoint ranges, given in ascending order.  The stride
    /// restarts at each range's start.
    pub fn build_ranges(data: &[u8], ranges: &[Range<usize>], hasher: &TokenHash, step: usize) -> Self {
        debug_assert!(step > 0);
        debug_assert!(ranges.windows(2).all(|w| w[0].end <= w[1].start));
        let look = hasher.look;

        let mut tokens: Vec<Entry> = Vec::new();
        for range in ranges {
            debug_assert!(range.end <= data.len());
            if range.end < range.start + look {
                continue;
            }
            let slots = (range.end - range.start - look) / step + 1;
            tokens.reserve(slots);
            for i in 0..slots {
                let pos = range.start + i * step;
                tokens.push(Entry {
                    cksum: hasher.checksum(&data[pos..pos + look]),
                    pos,
                });
            }
        }

        let bits = bucket_bits(tokens.len());
        let shift = 64 - bits;
        let buckets = 1usize << bits;

        let mut starts = vec![0usize; buckets + 1];
        for e in &tokens {
            starts[bucket_of(e.cksum, shift) + 1] += 1;
        }
        for b in 0..buckets {
            starts[b + 1] += starts[b];
        }

        // Stable scatter keeps ascending positions inside each bucket.
        let mut fill = starts.clone();
        let mut entries = vec![Entry { cksum: 0, pos: 0 }; tokens.len()];
        for e in tokens {
            let b = bucket_of(e.cksum, shift);
            entries[fill[b]] = e;
            fill[b] += 1;
        }

        Self {
            starts,
            entries,
            shift,
        }
    }

    #[inline(always)]
    fn bucket(&self, cksum: u64) -> &[Entry] {
        let b = bucket_of(cksum, self.shift);
        &self.entries[self.starts[b]..self.starts[b + 1]]
    }

    /// Positions whose token checksum equals `cksum`, in ascending order.
    ///
    /// Equal checksums do not imply equal bytes.
    pub fn candidates(&self, cksum: u64) -> impl Iterator<Item = usize> + '_ {
        self.candidates_from(cksum, 0)
    }

    /// Like `candidates`, but starting at the first position `>= from` and
    /// wrapping around to the positions below it.
    pub fn candidates_from(&self, cksum: u64, from: usize) -> impl Iterator<Item = usize> + '_ {
        let bucket = self.bucket(cksum);
        let split = bucket.partition_point(|e| e.pos < from);
        let (low, high) = bucket.split_at(split);
        high.iter()
            .chain(low)
            .filter(move |e| e.cksum == cksum)
            .map(|e| e.pos)
    }

    /// Number of indexed positions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bucket count.
    pub fn size(&self) -> usize {
        self.starts.len() - 1
    }
}

#[inline(always)]
fn bucket_of(cksum: u64, shift: u32) -> usize {
    (cksum.wrapping_mul(BUCKET_MULT) >> shift) as usize
}

/// Bucket bits for `slots` entries: next power of two, clamped.
fn bucket_bits(slots: usize) -> u32 {
    let bits = slots.max(1).next_power_of_two().trailing_zeros();
    bits.clamp(MIN_BITS, MAX_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_strided_positions_within_range() {
        let data = b"abcabcabcabcabc";
        let h = TokenHash::new(3);
        let index = MatchIndex::build(data, 0..data.len(), &h, 3);
        assert_eq!(index.len(), 5);
        let found: Vec<usize> = index.candidates(h.checksum(b"abc")).collect();
        assert_eq!(found, vec![0, 3, 6, 9, 12]);
    }

    #[test]
    fn stride_is_anchored_at_range_start() {
        let data = b"xxabcdabcdabcd";
        let h = TokenHash::new(2);
        let index = MatchIndex::build(data, 2..13, &h, 2);
        // Tokens at 2,4,6,8,10; 12 would overrun the range end.
        assert_eq!(index.len(), 5);
        let found: Vec<usize> = index.candidates(h.checksum(b"ab")).collect();
        assert_eq!(found, vec![2, 6, 10]);
        let found: Vec<usize> = index.candidates(h.checksum(b"cd")).collect();
        assert_eq!(found, vec![4, 8]);
    }

    #[test]
    fn lookup_from_position_wraps_around() {
        let data = b"abcabcabcabcabc";
        let h = TokenHash::new(3);
        let index = MatchIndex::build(data, 0..data.len(), &h, 3);
        let found: Vec<usize> = index.candidates_from(h.checksum(b"abc"), 7).collect();
        assert_eq!(found, vec![9, 12, 0, 3, 6]);
        let found: Vec<usize> = index.candidates_from(h.checksum(b"abc"), 100).collect();
        assert_eq!(found, vec![0, 3, 6, 9, 12]);
    }

    #[test]
    fn several_ranges_restart_the_stride() {
        let data = b"abababababab";
        let h = TokenHash::new(2);
        let index = MatchIndex::build_ranges(data, &[0..5, 7..12], &h, 2);
        // 0, 2 from the first range; 7, 9 from the second.
        assert_eq!(index.len(), 4);
        let found: Vec<usize> = index.candidates(h.checksum(b"ab")).collect();
        assert_eq!(found, vec![0, 2]);
        let found: Vec<usize> = index.candidates(h.checksum(b"ba")).collect();
        assert_eq!(found, vec![7, 9]);
    }

    #[test]
    fn range_shorter_than_token_is_empty() {
        let h = TokenHash::new(8);
        let index = MatchIndex::build(b"abcdef", 0..6, &h, 1);
        assert!(index.is_empty());
        assert_eq!(index.candidates(h.checksum(b"abcdefgh")).count(), 0);
        assert_eq!(index.size(), 1 << MIN_BITS);
    }

    #[test]
    fn missing_token_yields_nothing() {
        let h = TokenHash::new(4);
        let data = b"0123456789";
        let index = MatchIndex::build(data, 0..data.len(), &h, 1);
        assert_eq!(index.candidates(h.checksum(b"zzzz")).count(), 0);
        let found: Vec<usize> = index.candidates(h.checksum(b"4567")).collect();
        assert_eq!(found, vec![4]);
    }

    #[test]
    fn bucket_bits_clamped() {
        assert_eq!(bucket_bits(0), MIN_BITS);
        assert_eq!(bucket_bits(17), 5);
        assert_eq!(bucket_bits(1 << 20), 20);
    }
}
