#![no_main]

use libfuzzer_sys::fuzz_target;
use msbackup_crypt::{decrypt, EncryptedDescriptor};

const XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";

fuzz_target!(|data: &[u8]| {
    // Hostile encrypted text: whatever the blob length or share counts claim,
    // parsing and decrypting must never panic.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(parsed) = EncryptedDescriptor::parse(s) {
            let _ = parsed.to_text();
            let _ = parsed.max_required_sigs();
        }
        let _ = decrypt(s, &[XPUB]);
    }
});
