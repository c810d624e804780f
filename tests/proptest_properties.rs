use bdelta::patch::{Op, Patch};
use bdelta::{PassParams, Session};
use proptest::prelude::*;

fn pass_params() -> impl Strategy<Value = PassParams> {
    (1usize..48, 0usize..8).prop_flat_map(|(min, cap)| {
        (1usize..=min).prop_map(move |token| PassParams::new(min, token).max_candidates(cap))
    })
}

fn assert_sorted_disjoint(session: &Session<'_>) -> Result<(), TestCaseError> {
    let matches = session.matches();
    for m in &matches {
        prop_assert!(m.len > 0);
        prop_assert_eq!(
            &session.source()[m.source_pos..m.source_end()],
            &session.target()[m.target_pos..m.target_end()]
        );
    }
    for pair in matches.windows(2) {
        prop_assert!(pair[0].target_end() <= pair[1].target_pos);
        prop_assert!(pair[0].source_end() <= pair[1].source_pos);
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_diff_apply_roundtrip(
        source in proptest::collection::vec(any::<u8>(), 0..4096),
        target in proptest::collection::vec(any::<u8>(), 0..4096),
    ) {
        let patch = bdelta::diff(&source, &target).unwrap();
        let rebuilt = bdelta::apply(&source, &patch).unwrap();
        prop_assert_eq!(rebuilt, target);
    }

    #[test]
    fn prop_small_alphabet_roundtrip(
        source in proptest::collection::vec(0u8..4, 0..2048),
        target in proptest::collection::vec(0u8..4, 0..2048),
    ) {
        let patch = bdelta::diff(&source, &target).unwrap();
        prop_assert_eq!(bdelta::apply(&source, &patch).unwrap(), target);
    }

    #[test]
    fn prop_passes_keep_match_set_well_formed(
        source in proptest::collection::vec(0u8..8, 0..512),
        target in proptest::collection::vec(0u8..8, 0..512),
        passes in proptest::collection::vec(pass_params(), 1..5),
    ) {
        let mut session = Session::new(&source, &target);
        let mut coverage = 0;
        for params in passes {
            let added = session.run_pass(params).unwrap();
            for m in &added {
                prop_assert!(m.len >= params.min_match_len);
            }
            prop_assert!(session.coverage() >= coverage);
            coverage = session.coverage();
            assert_sorted_disjoint(&session)?;
        }
        let patch = session.encode_patch();
        prop_assert_eq!(bdelta::apply(&source, &patch).unwrap(), target);
    }

    #[test]
    fn prop_zero_runs_are_fully_covered(
        runs in proptest::collection::vec(32usize..200, 1..24),
        cap in prop_oneof![Just(1usize), Just(16usize), Just(128usize)],
    ) {
        // Every run of zeros fits in the all-zero source, so each one must
        // be matched in full no matter how many identical tokens compete.
        let total: usize = runs.iter().sum();
        let source = vec![0u8; total + 17 * runs.len() + 64];
        let mut target = Vec::with_capacity(total + runs.len());
        for &run in &runs {
            target.resize(target.len() + run, 0);
            target.push(1);
        }
        let mut session = Session::new(&source, &target);
        session.run_pass(PassParams::new(32, 16).max_candidates(cap)).unwrap();
        prop_assert_eq!(session.coverage(), total);
        prop_assert_eq!(session.num_matches(), runs.len());
        assert_sorted_disjoint(&session)?;
    }

    #[test]
    fn prop_operations_partition_target(
        source in proptest::collection::vec(any::<u8>(), 0..2048),
        edits in proptest::collection::vec((any::<u16>(), any::<u8>()), 0..16),
    ) {
        let mut target = source.clone();
        for (pos, byte) in edits {
            if !target.is_empty() {
                let i = pos as usize % target.len();
                target[i] = byte;
            }
        }
        let patch = bdelta::diff(&source, &target).unwrap();
        let parsed = Patch::parse(&patch).unwrap();
        let mut rebuilt = Vec::with_capacity(target.len());
        for op in &parsed.ops {
            match *op {
                Op::Copy { offset, len } => rebuilt.extend_from_slice(&source[offset..offset + len]),
                Op::Insert(bytes) => rebuilt.extend_from_slice(bytes),
            }
        }
        prop_assert_eq!(rebuilt, target);
    }

    #[test]
    fn prop_identical_data_is_one_copy(
        data in proptest::collection::vec(any::<u8>(), 1..8192),
    ) {
        let patch = bdelta::diff(&data, &data).unwrap();
        let parsed = Patch::parse(&patch).unwrap();
        prop_assert_eq!(parsed.ops, vec![Op::Copy { offset: 0, len: data.len() }]);
        prop_assert!(patch.len() < 64);
    }

    #[test]
    fn prop_diff_is_deterministic(
        source in proptest::collection::vec(0u8..16, 0..2048),
        target in proptest::collection::vec(0u8..16, 0..2048),
    ) {
        prop_assert_eq!(
            bdelta::diff(&source, &target).unwrap(),
            bdelta::diff(&source, &target).unwrap()
        );
    }

    #[test]
    fn prop_garbage_never_panics(
        source in proptest::collection::vec(any::<u8>(), 0..256),
        data in proptest::collection::vec(any::<u8>(), 0..512),
    ) {
        let _ = bdelta::apply(&source, &data);
        let _ = Patch::parse(&data);
    }
}

#[test]
#[ignore = "performance properties are workload and machine dependent"]
fn perf_property_diff_not_pathological() {
    use std::time::Instant;
    let make = |n: usize| -> Vec<u8> { (0..n).map(|i| (i % 251) as u8).collect() };
    let source = make(4 * 1024 * 1024);
    let mut target = source.clone();
    for i in (0..target.len()).step_by(4096) {
        target[i] = target[i].wrapping_add(3);
    }

    let t0 = Instant::now();
    let patch = bdelta::diff(&source, &target).unwrap();
    let dt = t0.elapsed();
    assert_eq!(bdelta::apply(&source, &patch).unwrap(), target);
    assert!(dt.as_secs_f64() < 20.0, "diff took {:?}", dt);
}
