// Patch header and framing constants.
//
// Layout:
//   magic (4) | version (1) | flags (1) | len(A) | len(B) | op count
//   | [adler32(A), 4 bytes BE, if SOURCE_CHECKSUM]
// followed by the operation stream, adler32(B) and adler32 of the whole
// preceding stream (both 4 bytes BE).

use super::decoder::MalformedPatch;
use super::varint;

pub const MAGIC: [u8; 4] = *b"BDLT";

pub const VERSION: u8 = 1;

/// Size of each trailing Adler-32 field.
pub const CHECKSUM_LEN: usize = 4;

/// Smallest well-formed patch: preamble, flags, three one-byte varints and
/// both trailing checksums.
pub const MIN_PATCH_LEN: usize = MAGIC.len() + 2 + 3 + 2 * CHECKSUM_LEN;

bitflags::bitflags! {
    /// Header flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PatchFlags: u8 {
        /// An Adler-32 of the source follows the op count.
        const SOURCE_CHECKSUM = 1 << 0;
    }
}

/// Parsed patch header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHeader {
    pub flags: PatchFlags,
    /// Length of the source the patch was made against.
    pub source_len: usize,
    /// Length of the reconstructed target.
    pub target_len: usize,
    /// Number of operations that follow.
    pub op_count: usize,
    /// Adler-32 of the source (if `SOURCE_CHECKSUM` is set).
    pub source_checksum: Option<u32>,
}

impl PatchHeader {
    /// Append the encoded header to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.flags.bits());
        varint::push_usize(out, self.source_len);
        varint::push_usize(out, self.target_len);
        varint::push_usize(out, self.op_count);
        if self.flags.contains(PatchFlags::SOURCE_CHECKSUM)
            && let Some(cksum) = self.source_checksum
        {
            out.extend_from_slice(&cksum.to_be_bytes());
        }
    }

    /// Parse the header at the front of `data`.
    ///
    /// Returns the header and the number of bytes consumed.
    pub fn read(data: &[u8]) -> Result<(Self, usize), MalformedPatch> {
        check_magic_version(data)?;
        let mut pos = MAGIC.len() + 1;

        let raw = *data.get(pos).ok_or(MalformedPatch::Truncated)?;
        let flags = PatchFlags::from_bits(raw).ok_or(MalformedPatch::UnknownFlags(raw))?;
        pos += 1;

        let (source_len, n) = varint::read_usize(&data[pos..])?;
        pos += n;
        let (target_len, n) = varint::read_usize(&data[pos..])?;
        pos += n;
        let (op_count, n) = varint::read_usize(&data[pos..])?;
        pos += n;

        let source_checksum = if flags.contains(PatchFlags::SOURCE_CHECKSUM) {
            let cksum = read_u32_be(data, pos)?;
            pos += CHECKSUM_LEN;
            Some(cksum)
        } else {
            None
        };

        Ok((
            Self {
                flags,
                source_len,
                target_len,
                op_count,
                source_checksum,
            },
            pos,
        ))
    }
}

/// Check minimum length, magic and version.
pub fn check_preamble(data: &[u8]) -> Result<(), MalformedPatch> {
    if data.len() < MIN_PATCH_LEN {
        return Err(MalformedPatch::Truncated);
    }
    check_magic_version(data)
}

fn check_magic_version(data: &[u8]) -> Result<(), MalformedPatch> {
    if data.len() <= MAGIC.len() {
        return Err(MalformedPatch::Truncated);
    }
    if data[..MAGIC.len()] != MAGIC {
        return Err(MalformedPatch::BadMagic);
    }
    let version = data[MAGIC.len()];
    if version != VERSION {
        return Err(MalformedPatch::UnsupportedVersion(version));
    }
    Ok(())
}

/// Big-endian u32 at `pos`.
pub fn read_u32_be(data: &[u8], pos: usize) -> Result<u32, MalformedPatch> {
    let bytes = data
        .get(pos..pos + CHECKSUM_LEN)
        .ok_or(MalformedPatch::Truncated)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Adler-32 used for every checksum in the format.
pub fn adler32(data: &[u8]) -> u32 {
    let mut hasher = simd_adler32::Adler32::new();
    hasher.write(data);
    hasher.finish()
}
