#![no_main]
use bdelta::{PassParams, PassScope, Session};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // First two bytes pick a pass (top bit: global), the rest splits into source and target.
    let min = usize::from(data[0] % 32) + 1;
    let token = usize::from(data[1]) % min + 1;
    let scope = if data[0] & 0x80 != 0 { PassScope::Global } else { PassScope::Local };
    let payload = &data[2..];
    let split = payload.len() / 2;
    let (source, target) = payload.split_at(split);

    let mut session = Session::new(source, target);
    session.run_pass(PassParams::new(min, token).max_candidates(8).scope(scope)).unwrap();
    let patch = session.encode_patch();
    assert_eq!(bdelta::apply(source, &patch).unwrap(), target);

    session.swap_inputs();
    assert_eq!(bdelta::apply(target, &session.encode_patch()).unwrap(), source);

    let patch = bdelta::diff(source, target).unwrap();
    assert_eq!(bdelta::apply(source, &patch).unwrap(), target);
});
