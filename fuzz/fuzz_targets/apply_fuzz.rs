#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must be rejected with an error, never a panic.
    let _ = bdelta::apply(&[], data);
    let _ = bdelta::patch::Patch::parse(data);
    let _ = bdelta::compress::unpack(data);

    if data.len() >= 2 {
        let split = data.len() / 2;
        let (source, patch) = data.split_at(split);
        let _ = bdelta::apply(source, patch);
    }
});
