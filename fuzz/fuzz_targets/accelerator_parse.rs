//! Fuzz target for hotkey accelerator strings.

#![no_main]

use everpad_indicator::Accelerator;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(accelerator) = Accelerator::parse(s) {
            // A parsed accelerator's label must parse back
            let label = accelerator.to_string();
            assert!(Accelerator::parse(&label).is_ok(), "label {:?}", label);
        }
    }
});
