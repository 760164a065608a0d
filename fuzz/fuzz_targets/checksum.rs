#![no_main]

use libfuzzer_sys::fuzz_target;
use msbackup_core::{descriptor_checksum, verify_checksum, with_checksum};

fuzz_target!(|data: &[u8]| {
    // Any string gets an 8-character checksum that verifies after appending.
    if let Ok(s) = std::str::from_utf8(data) {
        let checksum = descriptor_checksum(s);
        if !checksum.is_empty() {
            assert_eq!(checksum.len(), 8);
            assert!(verify_checksum(&with_checksum(s)));
        }
    }
});
