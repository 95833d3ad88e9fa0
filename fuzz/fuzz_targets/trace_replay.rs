#![no_main]

use fdtrail::event::parse_trace;
use fdtrail::replay::{replay_events, ReplayConfig};
use libfuzzer_sys::fuzz_target;

// Any parsable trace must replay without panicking, whatever the event order
fuzz_target!(|data: &[u8]| {
    if let Ok(events) = parse_trace(data) {
        let outcome = replay_events(&events, &ReplayConfig::default());
        if let Some(end) = outcome.end_time {
            let _ = fdtrail::report::Report::build(&outcome.state, &outcome.stats, end);
        }
    }
});
