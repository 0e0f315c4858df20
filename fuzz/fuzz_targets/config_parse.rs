//! Fuzz target for TOML config parsing and validation.

#![no_main]

use everpad_indicator::Config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = toml::from_str::<Config>(s) {
            // Validation parses the hotkey; it must reject, never panic
            let _ = config.validate();
            let _ = config.accelerator();
        }
    }
});
