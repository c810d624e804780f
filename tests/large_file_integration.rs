use bdelta::compress::SecondaryCompression;
use bdelta::engine::DiffOptions;
use bdelta::io::{apply_files, diff_files};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tempfile::NamedTempFile;

/// Random base buffer plus a target built from edits: overwritten runs,
/// inserted runs and deleted runs.
fn edited_pair(size: usize, edits: usize, seed: u64) -> (Vec<u8>, Vec<u8>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut source = vec![0u8; size];
    rng.fill_bytes(&mut source);

    let mut target = source.clone();
    for _ in 0..edits {
        let pos = rng.random_range(0..target.len());
        let run = rng.random_range(1..64usize).min(target.len() - pos);
        match rng.random_range(0..3u8) {
            0 => rng.fill_bytes(&mut target[pos..pos + run]),
            1 => {
                let mut fresh = vec![0u8; run];
                rng.fill_bytes(&mut fresh);
                target.splice(pos..pos, fresh);
            }
            _ => {
                target.drain(pos..pos + run);
            }
        }
    }
    (source, target)
}

#[test]
fn multi_mb_edited_file_roundtrip() {
    let (source_data, target_data) = edited_pair(4 * 1024 * 1024, 200, 0x5EED);
    let source = NamedTempFile::new().unwrap();
    let target = NamedTempFile::new().unwrap();
    let patch = NamedTempFile::new().unwrap();
    let output = NamedTempFile::new().unwrap();
    std::fs::write(source.path(), &source_data).unwrap();
    std::fs::write(target.path(), &target_data).unwrap();

    let stats = diff_files(
        source.path(),
        target.path(),
        patch.path(),
        &DiffOptions::default(),
        &SecondaryCompression::None,
    )
    .unwrap();
    assert!(
        stats.patch_size < target_data.len() as u64 / 50,
        "patch={} target={}",
        stats.patch_size,
        target_data.len()
    );
    assert!(stats.inserted_bytes <= 200 * 64);

    let applied = apply_files(source.path(), patch.path(), output.path()).unwrap();
    assert_eq!(applied.output_size, target_data.len() as u64);
    assert_eq!(std::fs::read(output.path()).unwrap(), target_data);
}

#[test]
#[ignore = "large inputs are opt-in due runtime and memory requirements"]
fn sixty_four_mb_roundtrip() {
    let (source, target) = edited_pair(64 * 1024 * 1024, 2000, 64);
    let patch = bdelta::diff(&source, &target).unwrap();
    assert!(patch.len() < target.len() / 100);
    assert_eq!(bdelta::apply(&source, &patch).unwrap(), target);
}
