// Optional compression envelope around serialized patches.
//
//   "BDZ\0" | codec id (1) | compressed patch
//
// The patch format itself is unchanged; `unpack` passes bare patches through
// untouched, so readers accept both forms.  Envelopes from custom backends
// need `unpack_with`.
//
// - `secondary`: pluggable backends (LZMA, Zlib, custom)

pub mod secondary;

use std::borrow::Cow;
use std::io;
use std::sync::Arc;

use log::debug;

use crate::patch::MalformedPatch;

pub use secondary::{CompressBackend, SecondaryCompression, backend_for_id};

/// Envelope magic.
pub const ENVELOPE_MAGIC: [u8; 4] = *b"BDZ\0";

const ENVELOPE_HEADER_LEN: usize = ENVELOPE_MAGIC.len() + 1;

/// Whether `data` carries the compression envelope.
pub fn is_packed(data: &[u8]) -> bool {
    data.starts_with(&ENVELOPE_MAGIC)
}

/// Wrap `patch` with the selected compression.
///
/// The bare patch is returned when compression is disabled, the backend
/// declines, or compressing would not make it smaller.
pub fn pack(patch: &[u8], secondary: &SecondaryCompression) -> io::Result<Vec<u8>> {
    let Some(backend) = secondary.backend() else {
        return Ok(patch.to_vec());
    };
    if !backend.should_compress(patch) {
        return Ok(patch.to_vec());
    }

    let compressed = backend.compress(patch)?;
    if compressed.len() + ENVELOPE_HEADER_LEN >= patch.len() {
        debug!(
            "codec {} did not shrink {} byte patch, writing it bare",
            backend.id(),
            patch.len()
        );
        return Ok(patch.to_vec());
    }

    let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + compressed.len());
    out.extend_from_slice(&ENVELOPE_MAGIC);
    out.push(backend.id());
    out.extend_from_slice(&compressed);
    debug!(
        "packed patch with codec {}: {} -> {} bytes",
        backend.id(),
        patch.len(),
        out.len()
    );
    Ok(out)
}

/// Strip the envelope, if any, and return the bare patch.
pub fn unpack(data: &[u8]) -> Result<Cow<'_, [u8]>, MalformedPatch> {
    unpack_with(data, &[])
}

/// Like `unpack`, but also accepts envelopes written by one of `custom`.
///
/// Custom backends are matched by id before the built-in codecs.
pub fn unpack_with<'a>(
    data: &'a [u8],
    custom: &[Arc<dyn CompressBackend>],
) -> Result<Cow<'a, [u8]>, MalformedPatch> {
    if !is_packed(data) {
        return Ok(Cow::Borrowed(data));
    }
    let id = *data.get(ENVELOPE_MAGIC.len()).ok_or(MalformedPatch::Truncated)?;
    let body = &data[ENVELOPE_HEADER_LEN..];
    let patch = match custom.iter().find(|b| b.id() == id) {
        Some(backend) => backend.decompress(body)?,
        None => backend_for_id(id)?.decompress(body)?,
    };
    debug!("unpacked codec {id} envelope: {} -> {} bytes", data.len(), patch.len());
    Ok(Cow::Owned(patch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;

    fn compressible_patch() -> Vec<u8> {
        let source: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let target: Vec<u8> = b"new material, repeated. ".iter().copied().cycle().take(2048).collect();
        engine::diff(&source, &target).unwrap()
    }

    #[test]
    fn none_is_bare() {
        let patch = compressible_patch();
        let packed = pack(&patch, &SecondaryCompression::None).unwrap();
        assert_eq!(packed, patch);
        assert!(matches!(unpack(&packed).unwrap(), Cow::Borrowed(_)));
    }

    #[cfg(feature = "zlib-secondary")]
    #[test]
    fn zlib_envelope_roundtrip() {
        let patch = compressible_patch();
        let packed = pack(&patch, &SecondaryCompression::Zlib { level: 9 }).unwrap();
        assert!(is_packed(&packed));
        assert_eq!(packed[4], secondary::ZLIB_ID);
        assert!(packed.len() < patch.len());
        assert_eq!(unpack(&packed).unwrap().as_ref(), patch.as_slice());
    }

    #[cfg(feature = "lzma-secondary")]
    #[test]
    fn lzma_envelope_roundtrip() {
        let patch = compressible_patch();
        let packed = pack(&patch, &SecondaryCompression::Lzma).unwrap();
        assert_eq!(packed[4], secondary::LZMA_ID);
        assert_eq!(unpack(&packed).unwrap().as_ref(), patch.as_slice());
    }

    #[cfg(feature = "zlib-secondary")]
    #[test]
    fn tiny_patch_stays_bare() {
        let patch = engine::diff(b"abc", b"abd").unwrap();
        let packed = pack(&patch, &SecondaryCompression::Zlib { level: 6 }).unwrap();
        assert_eq!(packed, patch);
    }

    struct XorBackend;

    impl CompressBackend for XorBackend {
        fn id(&self) -> u8 {
            0x63
        }

        fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
            // Keep only every other byte of an all-0xAA payload.
            Ok(data.iter().step_by(2).map(|b| b ^ 0x55).collect())
        }

        fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, MalformedPatch> {
            Ok(data.iter().flat_map(|b| [b ^ 0x55; 2]).collect())
        }
    }

    #[test]
    fn custom_envelope_needs_its_backend() {
        let custom: Arc<dyn CompressBackend> = Arc::new(XorBackend);
        let patch = vec![0xAAu8; 64];
        let packed = pack(&patch, &SecondaryCompression::Custom(custom.clone())).unwrap();
        assert_eq!(&packed[..5], b"BDZ\0\x63");
        assert!(unpack(&packed).is_err());
        assert_eq!(unpack_with(&packed, &[custom.clone()]).unwrap().as_ref(), patch.as_slice());
        // Bare patches still pass through.
        assert!(matches!(unpack_with(&patch, &[custom]).unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn bad_envelopes_are_malformed() {
        assert_eq!(unpack(b"BDZ\0"), Err(MalformedPatch::Truncated));
        assert!(matches!(
            unpack(b"BDZ\0\x63payload"),
            Err(MalformedPatch::Decompression(_))
        ));
    }
}
