// Patch wire format: header, edit-script encoder and validating applier.
//
// - `varint`: big-endian base-128 integers
// - `header`: magic, version, flags, lengths, framing checksums
// - `encoder`: match set -> `Op` list -> bytes
// - `decoder`: bytes -> validated `Patch` / reconstructed target

pub mod decoder;
pub mod encoder;
pub mod header;
pub mod varint;

pub use decoder::{MalformedPatch, Patch, apply};
pub use encoder::{EncodeOptions, Op, encode, operations};
pub use header::{PatchFlags, PatchHeader};
