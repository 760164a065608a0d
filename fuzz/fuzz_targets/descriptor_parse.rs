#![no_main]

use libfuzzer_sys::fuzz_target;
use msbackup_core::{strip_descriptor, Descriptor};

fuzz_target!(|data: &[u8]| {
    // Parsing arbitrary text must return Ok or Err, never panic.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(descriptor) = Descriptor::parse(s) {
            let _ = Descriptor::parse_stripped(&descriptor.stripped());
            let _ = descriptor.to_descriptor_string();
            let _ = descriptor.suggested_origin_path();
        }
        let _ = Descriptor::parse_stripped(s);
        let _ = strip_descriptor(s);
    }
});
