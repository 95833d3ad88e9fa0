#![no_main]

use fdtrail::filter::SyscallFilter;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(filter) = SyscallFilter::from_expr(input) {
            let _ = filter.should_trace("read");
        }
    }
});
