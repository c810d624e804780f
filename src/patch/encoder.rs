// Patch encoder: match set -> edit script -> serialized patch.

use log::debug;

use super::header::{self, PatchFlags, PatchHeader};
use super::varint;
use crate::hash::matching::Match;

/// Operation tag for a copy from the source.
pub const OP_COPY: u8 = 0x01;

/// Operation tag for literal target bytes.
pub const OP_INSERT: u8 = 0x02;

/// One edit operation.  Literal bytes borrow from the target (or, when
/// parsed, from the patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op<'a> {
    /// Append `source[offset..offset + len]`.
    Copy { offset: usize, len: usize },
    /// Append the bytes verbatim.
    Insert(&'a [u8]),
}

impl Op<'_> {
    /// Number of output bytes this operation produces.
    pub fn output_len(&self) -> usize {
        match self {
            Op::Copy { len, .. } => *len,
            Op::Insert(bytes) => bytes.len(),
        }
    }

    /// Serialized size.
    pub fn encoded_len(&self) -> usize {
        match self {
            Op::Copy { offset, len } => 1 + varint::sizeof_usize(*offset) + varint::sizeof_usize(*len),
            Op::Insert(bytes) => 1 + varint::sizeof_usize(bytes.len()) + bytes.len(),
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Op::Copy { offset, len } => {
                out.push(OP_COPY);
                varint::push_usize(out, *offset);
                varint::push_usize(out, *len);
            }
            Op::Insert(bytes) => {
                out.push(OP_INSERT);
                varint::push_usize(out, bytes.len());
                out.extend_from_slice(bytes);
            }
        }
    }
}

/// Configuration for patch serialization.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Embed an Adler-32 of the source so a wrong base is rejected up front.
    pub source_checksum: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            source_checksum: true,
        }
    }
}

/// Walk the target from 0 to `target.len()`, emitting a copy for every match
/// and an insert for every uncovered stretch.
///
/// `matches` must be sorted by target position and non-overlapping.  Copies
/// that continue each other in both buffers are merged; zero-length
/// operations are never produced.
pub fn operations<'a>(matches: &[Match], target: &'a [u8]) -> Vec<Op<'a>> {
    let mut ops: Vec<Op<'a>> = Vec::with_capacity(matches.len() * 2 + 1);
    let mut pos = 0usize;

    for m in matches {
        assert!(
            m.target_pos >= pos && m.target_end() <= target.len(),
            "match {m} out of order or past the target end"
        );
        if m.target_pos > pos {
            ops.push(Op::Insert(&target[pos..m.target_pos]));
        }
        if m.len > 0 {
            match ops.last_mut() {
                Some(Op::Copy { offset, len }) if *offset + *len == m.source_pos => {
                    *len += m.len;
                }
                _ => ops.push(Op::Copy {
                    offset: m.source_pos,
                    len: m.len,
                }),
            }
        }
        pos = m.target_end();
    }
    if pos < target.len() {
        ops.push(Op::Insert(&target[pos..]));
    }
    ops
}

/// Serialize a complete patch for `matches`.
pub fn encode(source: &[u8], target: &[u8], matches: &[Match], opts: &EncodeOptions) -> Vec<u8> {
    let ops = operations(matches, target);
    encode_operations(source, target, &ops, opts)
}

/// Serialize an already-built edit script.
///
/// The script must reproduce `target` from `source`.
pub fn encode_operations(source: &[u8], target: &[u8], ops: &[Op<'_>], opts: &EncodeOptions) -> Vec<u8> {
    debug_assert_eq!(ops.iter().map(Op::output_len).sum::<usize>(), target.len());

    let (flags, source_checksum) = if opts.source_checksum {
        (PatchFlags::SOURCE_CHECKSUM, Some(header::adler32(source)))
    } else {
        (PatchFlags::empty(), None)
    };
    let hdr = PatchHeader {
        flags,
        source_len: source.len(),
        target_len: target.len(),
        op_count: ops.len(),
        source_checksum,
    };

    let body_len: usize = ops.iter().map(Op::encoded_len).sum();
    let mut out = Vec::with_capacity(32 + body_len + 2 * header::CHECKSUM_LEN);
    hdr.write(&mut out);
    let header_len = out.len();
    for op in ops {
        op.write(&mut out);
    }
    out.extend_from_slice(&header::adler32(target).to_be_bytes());
    let stream_cksum = header::adler32(&out);
    out.extend_from_slice(&stream_cksum.to_be_bytes());

    debug!(
        "encoded patch: {} ops, header {header_len} bytes, body {body_len} bytes, total {} bytes",
        ops.len(),
        out.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &[u8] = b"The quick brown fox jumped over the lazy dog";
    const B: &[u8] = b"The quick drowned fox jumped over the lazy dog";

    fn ms(v: &[(usize, usize, usize)]) -> Vec<Match> {
        v.iter().map(|&t| Match::from(t)).collect()
    }

    #[test]
    fn operations_cover_target() {
        let ops = operations(&ms(&[(0, 0, 10), (11, 11, 4), (15, 17, 29)]), B);
        assert_eq!(
            ops,
            vec![
                Op::Copy { offset: 0, len: 10 },
                Op::Insert(b"d"),
                Op::Copy { offset: 11, len: 4 },
                Op::Insert(b"ed"),
                Op::Copy { offset: 15, len: 29 },
            ]
        );
        assert_eq!(ops.iter().map(Op::output_len).sum::<usize>(), B.len());
    }

    #[test]
    fn contiguous_copies_are_merged() {
        let ops = operations(&ms(&[(0, 0, 4), (4, 4, 6), (20, 10, 2)]), &A[..12]);
        assert_eq!(
            ops,
            vec![Op::Copy { offset: 0, len: 10 }, Op::Copy { offset: 20, len: 2 }]
        );
    }

    #[test]
    fn no_matches_is_single_insert() {
        assert_eq!(operations(&[], B), vec![Op::Insert(B)]);
        assert!(operations(&[], b"").is_empty());
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn overlapping_matches_panic() {
        operations(&ms(&[(0, 0, 10), (0, 5, 3)]), B);
    }

    #[test]
    fn encoded_lengths_are_exact() {
        let ops = [Op::Copy { offset: 300, len: 5 }, Op::Insert(b"hello")];
        for op in &ops {
            let mut out = Vec::new();
            op.write(&mut out);
            assert_eq!(out.len(), op.encoded_len());
        }
    }

    #[test]
    fn stream_layout() {
        let patch = encode(b"", b"hi", &[], &EncodeOptions { source_checksum: false });
        let mut expected = vec![b'B', b'D', b'L', b'T', 1, 0, 0, 2, 1, OP_INSERT, 2, b'h', b'i'];
        expected.extend_from_slice(&header::adler32(b"hi").to_be_bytes());
        let stream = header::adler32(&expected);
        expected.extend_from_slice(&stream.to_be_bytes());
        assert_eq!(patch, expected);
    }
}
