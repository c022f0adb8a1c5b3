#![no_main]

use libfuzzer_sys::fuzz_target;
use tallyprof::persist;

fuzz_target!(|data: &[u8]| {
    persist::load(data).ok();
});
