#![no_main]

use benchdiff::regression::parse_bench_output;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Logs are decoded lossily in the real pipeline too.
    let text = String::from_utf8_lossy(data);
    let samples = parse_bench_output(&text);
    for metric in samples.metrics() {
        for key in samples.keys(metric) {
            assert!(samples.get(metric, key).is_some());
        }
    }
});
