// File-level helpers for diffing and patching.
//
// Provides `diff_files()` and `apply_files()` convenience functions that
// read both inputs into memory, run the engine, and write the result with
// buffered I/O. Optionally computes SHA-256 checksums (feature-gated behind
// `file-io`).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::compress::{self, SecondaryCompression};
use crate::engine::{self, DiffOptions};
use crate::error::Result;
use crate::patch::{Op, Patch};

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `diff_files()`.
#[derive(Debug, Clone)]
pub struct DiffStats {
    /// Source file size in bytes.
    pub source_size: u64,
    /// Target file size in bytes.
    pub target_size: u64,
    /// Size of the written patch file.
    pub patch_size: u64,
    /// Accepted matches after all passes.
    pub matches: usize,
    pub copy_ops: usize,
    pub insert_ops: usize,
    /// Target bytes reproduced by copies.
    pub copied_bytes: u64,
    /// Target bytes carried as literals.
    pub inserted_bytes: u64,
    /// Whether the patch was written inside a compression envelope.
    pub packed: bool,
    /// SHA-256 of the source file (if `file-io` feature is enabled).
    pub source_sha256: Option<[u8; 32]>,
    /// SHA-256 of the target file (if `file-io` feature is enabled).
    pub target_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `apply_files()`.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    /// Source file size in bytes.
    pub source_size: u64,
    /// Patch file size in bytes (as stored, possibly compressed).
    pub patch_size: u64,
    /// Reconstructed output size in bytes.
    pub output_size: u64,
    /// Operations replayed.
    pub ops: usize,
    /// SHA-256 of the reconstructed output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// diff_files
// ---------------------------------------------------------------------------

/// Diff a source file against a target file, writing the patch to `patch_path`.
///
/// Both inputs are read fully into memory.
pub fn diff_files(
    source_path: &Path,
    target_path: &Path,
    patch_path: &Path,
    opts: &DiffOptions,
    secondary: &SecondaryCompression,
) -> Result<DiffStats> {
    let source = std::fs::read(source_path)?;
    let target = std::fs::read(target_path)?;

    let session = engine::matched_session(&source, &target, opts)?;
    let ops = session.operations();
    let patch = session.encode_patch_with(&opts.encode);
    let stored = compress::pack(&patch, secondary)?;
    write_file(patch_path, &stored)?;

    let (mut copy_ops, mut copied_bytes) = (0, 0u64);
    for op in &ops {
        if let Op::Copy { len, .. } = op {
            copy_ops += 1;
            copied_bytes += *len as u64;
        }
    }

    Ok(DiffStats {
        source_size: source.len() as u64,
        target_size: target.len() as u64,
        patch_size: stored.len() as u64,
        matches: session.matches().len(),
        copy_ops,
        insert_ops: ops.len() - copy_ops,
        copied_bytes,
        inserted_bytes: target.len() as u64 - copied_bytes,
        packed: compress::is_packed(&stored),
        source_sha256: sha256(&source),
        target_sha256: sha256(&target),
    })
}

// ---------------------------------------------------------------------------
// apply_files
// ---------------------------------------------------------------------------

/// Apply a patch file to a source file, writing the target to `output_path`.
///
/// Compressed patches are unpacked transparently. Nothing is written unless
/// the patch applies cleanly.
pub fn apply_files(source_path: &Path, patch_path: &Path, output_path: &Path) -> Result<ApplyStats> {
    let source = std::fs::read(source_path)?;
    let stored = std::fs::read(patch_path)?;
    let patch = compress::unpack(&stored)?;

    let output = engine::apply(&source, &patch)?;
    write_file(output_path, &output)?;

    let ops = Patch::parse(&patch).map(|p| p.ops.len())?;
    Ok(ApplyStats {
        source_size: source.len() as u64,
        patch_size: stored.len() as u64,
        output_size: output.len() as u64,
        ops,
        output_sha256: sha256(&output),
    })
}

fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut writer = BufWriter::with_capacity(BUF_SIZE, File::create(path)?);
    writer.write_all(data)?;
    writer.flush()
}

#[cfg(feature = "file-io")]
fn sha256(data: &[u8]) -> Option<[u8; 32]> {
    Some(sha2::Sha256::digest(data).into())
}

#[cfg(not(feature = "file-io"))]
fn sha256(_data: &[u8]) -> Option<[u8; 32]> {
    None
}

/// Lowercase hex rendering of a digest.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
