// Whole-patch codecs behind the `BDZ\0` envelope.
//
//   id 2  LZMA   (lzma-rs, `lzma-secondary`)
//   id 3  zlib   (flate2, `zlib-secondary`)
//
// Callers may plug in their own `CompressBackend` with any other id; reading
// such an envelope back goes through `unpack_with`.

use std::fmt;
use std::io;
use std::sync::Arc;

use crate::patch::MalformedPatch;

pub const LZMA_ID: u8 = 2;
pub const ZLIB_ID: u8 = 3;

/// Patches shorter than this are always written bare.
const MIN_PACKED_INPUT: usize = 32;

/// Codec applied to a serialized patch as a whole.
///
/// ```no_run
/// use std::sync::Arc;
/// use bdelta::compress::{self, CompressBackend, SecondaryCompression};
/// use bdelta::patch::MalformedPatch;
///
/// struct Stored;
///
/// impl CompressBackend for Stored {
///     fn id(&self) -> u8 { 42 }
///     fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
///         Ok(data.to_vec())
///     }
///     fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, MalformedPatch> {
///         Ok(data.to_vec())
///     }
/// }
///
/// let codec: Arc<dyn CompressBackend> = Arc::new(Stored);
/// let patch = bdelta::diff(b"old bytes", b"new bytes").unwrap();
/// let packed = compress::pack(&patch, &SecondaryCompression::Custom(codec.clone())).unwrap();
/// let bare = compress::unpack_with(&packed, &[codec]).unwrap();
/// assert_eq!(bare.as_ref(), patch.as_slice());
/// ```
pub trait CompressBackend: Send + Sync {
    /// Envelope id.  2 and 3 are taken by the built-in codecs.
    fn id(&self) -> u8;

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, MalformedPatch>;

    /// `pack` skips the codec when this returns false.
    fn should_compress(&self, data: &[u8]) -> bool {
        data.len() >= MIN_PACKED_INPUT
    }
}

#[cfg(any(feature = "lzma-secondary", feature = "zlib-secondary"))]
fn corrupt(codec: &str, e: impl fmt::Display) -> MalformedPatch {
    MalformedPatch::Decompression(format!("{codec}: {e}"))
}

#[cfg(not(all(feature = "lzma-secondary", feature = "zlib-secondary")))]
fn feature_missing(id: u8, feature: &str) -> MalformedPatch {
    MalformedPatch::Decompression(format!("codec {id} needs the '{feature}' feature"))
}

/// LZMA, envelope id 2.
#[cfg(feature = "lzma-secondary")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LzmaBackend;

#[cfg(feature = "lzma-secondary")]
impl CompressBackend for LzmaBackend {
    fn id(&self) -> u8 {
        LZMA_ID
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut packed = Vec::with_capacity(data.len() / 2);
        lzma_rs::lzma_compress(&mut io::Cursor::new(data), &mut packed)?;
        Ok(packed)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, MalformedPatch> {
        let mut patch = Vec::new();
        lzma_rs::lzma_decompress(&mut io::BufReader::new(data), &mut patch)
            .map_err(|e| corrupt("LZMA", e))?;
        Ok(patch)
    }
}

/// zlib-framed deflate, envelope id 3.  The adler32 trailer catches
/// corruption of the compressed body.
#[cfg(feature = "zlib-secondary")]
#[derive(Debug, Clone, Copy)]
pub struct ZlibBackend {
    level: u32,
}

#[cfg(feature = "zlib-secondary")]
impl ZlibBackend {
    /// Levels above 9 are clamped.
    pub fn new(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

#[cfg(feature = "zlib-secondary")]
impl Default for ZlibBackend {
    fn default() -> Self {
        Self::new(6)
    }
}

#[cfg(feature = "zlib-secondary")]
impl CompressBackend for ZlibBackend {
    fn id(&self) -> u8 {
        ZLIB_ID
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let level = flate2::Compression::new(self.level);
        let mut zlib = flate2::write::ZlibEncoder::new(Vec::with_capacity(data.len() / 2), level);
        io::Write::write_all(&mut zlib, data)?;
        zlib.finish()
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, MalformedPatch> {
        let mut patch = Vec::new();
        io::Read::read_to_end(&mut flate2::read::ZlibDecoder::new(data), &mut patch)
            .map_err(|e| corrupt("zlib", e))?;
        Ok(patch)
    }
}

/// Built-in codec for an envelope id.
pub fn backend_for_id(id: u8) -> Result<Box<dyn CompressBackend>, MalformedPatch> {
    match id {
        #[cfg(feature = "lzma-secondary")]
        LZMA_ID => Ok(Box::new(LzmaBackend)),
        #[cfg(not(feature = "lzma-secondary"))]
        LZMA_ID => Err(feature_missing(id, "lzma-secondary")),
        #[cfg(feature = "zlib-secondary")]
        ZLIB_ID => Ok(Box::new(ZlibBackend::default())),
        #[cfg(not(feature = "zlib-secondary"))]
        ZLIB_ID => Err(feature_missing(id, "zlib-secondary")),
        id => Err(MalformedPatch::Decompression(format!("unknown codec ID {id}"))),
    }
}

/// Codec selection for `pack`.
#[derive(Clone, Default)]
pub enum SecondaryCompression {
    /// Write the bare patch.
    #[default]
    None,
    #[cfg(feature = "lzma-secondary")]
    Lzma,
    #[cfg(feature = "zlib-secondary")]
    Zlib { level: u32 },
    /// Caller-supplied codec; read it back with `compress::unpack_with`.
    Custom(Arc<dyn CompressBackend>),
}

impl fmt::Debug for SecondaryCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend() {
            None => f.write_str("None"),
            Some(b) => write!(f, "Codec(id={})", b.id()),
        }
    }
}

impl SecondaryCompression {
    /// `None` when patches are written bare.
    pub fn backend(&self) -> Option<Arc<dyn CompressBackend>> {
        match self {
            Self::None => None,
            #[cfg(feature = "lzma-secondary")]
            Self::Lzma => Some(Arc::new(LzmaBackend)),
            #[cfg(feature = "zlib-secondary")]
            Self::Zlib { level } => Some(Arc::new(ZlibBackend::new(*level))),
            Self::Custom(b) => Some(Arc::clone(b)),
        }
    }
}
