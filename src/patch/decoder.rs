// Patch decoder and applier.
//
// Validation happens in a fixed order so that every malformed input is
// rejected with the most specific error available:
//   1. minimum length, magic, version
//   2. stream checksum over everything before the last 4 bytes
//   3. flags, lengths, op count (header)
//   4. source length and source checksum (apply only)
//   5. each op: tag, non-zero length, copy bounds, output bound, literal bytes
//   6. exact target length, trailer, target checksum
//
// Output is assembled in a private buffer and only returned on success.

use log::debug;

use super::encoder::{OP_COPY, OP_INSERT, Op};
use super::header::{self, CHECKSUM_LEN, PatchHeader};
use super::varint::{self, VarIntError};

/// Upper bound on the up-front output allocation; larger targets grow.
const MAX_PREALLOC: usize = 64 << 20;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a patch is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedPatch {
    #[error("patch is truncated")]
    Truncated,
    #[error("bad magic (not a bdelta patch)")]
    BadMagic,
    #[error("unsupported patch format version {0}")]
    UnsupportedVersion(u8),
    #[error("patch stream checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    StreamChecksumMismatch { expected: u32, actual: u32 },
    #[error("unknown header flags {0:#04X}")]
    UnknownFlags(u8),
    #[error("source length {actual} does not match the {expected} bytes the patch was made against")]
    SourceLengthMismatch { expected: usize, actual: usize },
    #[error("source checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    SourceChecksumMismatch { expected: u32, actual: u32 },
    #[error("unknown operation tag {tag:#04X} at op {index}")]
    UnknownOp { index: usize, tag: u8 },
    #[error("zero-length operation at op {index}")]
    EmptyOperation { index: usize },
    #[error("copy {offset}+{len} at op {index} exceeds source length {source_len}")]
    CopyOutOfBounds {
        index: usize,
        offset: usize,
        len: usize,
        source_len: usize,
    },
    #[error("operation {index} writes past the declared target length {target_len}")]
    OutputOverflow { index: usize, target_len: usize },
    #[error("operations produce {actual} bytes, header declares {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("{0} unexpected bytes after the operation stream")]
    TrailingData(usize),
    #[error("target checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("bad integer: {0}")]
    VarInt(#[from] VarIntError),
    #[error("decompression failed: {0}")]
    Decompression(String),
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Check preamble and stream checksum; returns the covered bytes.
fn verify_frame(data: &[u8]) -> Result<&[u8], MalformedPatch> {
    header::check_preamble(data)?;
    let (body, trailer) = data.split_at(data.len() - CHECKSUM_LEN);
    let expected = header::read_u32_be(trailer, 0)?;
    let actual = header::adler32(body);
    if expected != actual {
        return Err(MalformedPatch::StreamChecksumMismatch { expected, actual });
    }
    Ok(body)
}

/// Sequential reader over the operation stream.
struct OpReader<'a> {
    data: &'a [u8],
    pos: usize,
    index: usize,
    remaining: usize,
    source_len: usize,
    target_len: usize,
    produced: usize,
}

impl<'a> OpReader<'a> {
    fn new(data: &'a [u8], pos: usize, hdr: &PatchHeader) -> Self {
        Self {
            data,
            pos,
            index: 0,
            remaining: hdr.op_count,
            source_len: hdr.source_len,
            target_len: hdr.target_len,
            produced: 0,
        }
    }

    fn read_varint(&mut self) -> Result<usize, MalformedPatch> {
        let (val, n) = varint::read_usize(&self.data[self.pos..])?;
        self.pos += n;
        Ok(val)
    }

    fn read_op(&mut self) -> Result<Op<'a>, MalformedPatch> {
        let index = self.index;
        let tag = *self.data.get(self.pos).ok_or(MalformedPatch::Truncated)?;
        self.pos += 1;

        let op = match tag {
            OP_COPY => {
                let offset = self.read_varint()?;
                let len = self.read_varint()?;
                if len == 0 {
                    return Err(MalformedPatch::EmptyOperation { index });
                }
                if offset.checked_add(len).is_none_or(|end| end > self.source_len) {
                    return Err(MalformedPatch::CopyOutOfBounds {
                        index,
                        offset,
                        len,
                        source_len: self.source_len,
                    });
                }
                Op::Copy { offset, len }
            }
            OP_INSERT => {
                let len = self.read_varint()?;
                if len == 0 {
                    return Err(MalformedPatch::EmptyOperation { index });
                }
                let bytes = self
                    .pos
                    .checked_add(len)
                    .and_then(|end| self.data.get(self.pos..end))
                    .ok_or(MalformedPatch::Truncated)?;
                self.pos += len;
                Op::Insert(bytes)
            }
            tag => return Err(MalformedPatch::UnknownOp { index, tag }),
        };

        self.produced = match self.produced.checked_add(op.output_len()) {
            Some(total) if total <= self.target_len => total,
            _ => {
                return Err(MalformedPatch::OutputOverflow {
                    index,
                    target_len: self.target_len,
                });
            }
        };
        self.index += 1;
        self.remaining -= 1;
        Ok(op)
    }

    /// After the last op: exact length, trailer, no trailing data.
    /// Returns the stored target checksum.
    fn finish(self) -> Result<u32, MalformedPatch> {
        if self.produced != self.target_len {
            return Err(MalformedPatch::LengthMismatch {
                expected: self.target_len,
                actual: self.produced,
            });
        }
        let rest = self.data.len() - self.pos;
        if rest < CHECKSUM_LEN {
            return Err(MalformedPatch::Truncated);
        }
        if rest > CHECKSUM_LEN {
            return Err(MalformedPatch::TrailingData(rest - CHECKSUM_LEN));
        }
        header::read_u32_be(self.data, self.pos)
    }
}

impl<'a> Iterator for OpReader<'a> {
    type Item = Result<Op<'a>, MalformedPatch>;

    fn next(&mut self) -> Option<Self::Item> {
        (self.remaining > 0).then(|| self.read_op())
    }
}

// ---------------------------------------------------------------------------
// Parsed patch (inspection)
// ---------------------------------------------------------------------------

/// A fully validated patch, independent of any source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch<'a> {
    pub header: PatchHeader,
    pub ops: Vec<Op<'a>>,
    /// Adler-32 of the target.
    pub target_checksum: u32,
}

impl<'a> Patch<'a> {
    /// Parse and validate everything that does not need the source.
    pub fn parse(data: &'a [u8]) -> Result<Self, MalformedPatch> {
        let body = verify_frame(data)?;
        let (header, pos) = PatchHeader::read(body)?;
        let mut reader = OpReader::new(body, pos, &header);
        let mut ops = Vec::with_capacity(header.op_count.min(body.len() / 2));
        for op in reader.by_ref() {
            ops.push(op?);
        }
        let target_checksum = reader.finish()?;
        Ok(Self {
            header,
            ops,
            target_checksum,
        })
    }

    /// Sum of copied bytes.
    pub fn copied_bytes(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Copy { .. }))
            .map(Op::output_len)
            .sum()
    }

    /// Sum of literal bytes.
    pub fn inserted_bytes(&self) -> usize {
        self.header.target_len - self.copied_bytes()
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Reconstruct the target from `source` and a serialized patch.
///
/// Never returns partial output: either the verified target or an error.
pub fn apply(source: &[u8], data: &[u8]) -> Result<Vec<u8>, MalformedPatch> {
    let body = verify_frame(data)?;
    let (hdr, pos) = PatchHeader::read(body)?;

    if hdr.source_len != source.len() {
        return Err(MalformedPatch::SourceLengthMismatch {
            expected: hdr.source_len,
            actual: source.len(),
        });
    }
    if let Some(expected) = hdr.source_checksum {
        let actual = header::adler32(source);
        if expected != actual {
            return Err(MalformedPatch::SourceChecksumMismatch { expected, actual });
        }
    }

    let mut output = Vec::with_capacity(hdr.target_len.min(MAX_PREALLOC));
    let mut reader = OpReader::new(body, pos, &hdr);
    for op in reader.by_ref() {
        match op? {
            Op::Copy { offset, len } => output.extend_from_slice(&source[offset..offset + len]),
            Op::Insert(bytes) => output.extend_from_slice(bytes),
        }
    }
    let expected = reader.finish()?;
    let actual = header::adler32(&output);
    if expected != actual {
        return Err(MalformedPatch::ChecksumMismatch { expected, actual });
    }

    debug!(
        "applied patch: {} ops, {} -> {} bytes",
        hdr.op_count,
        source.len(),
        output.len()
    );
    Ok(output)
}
