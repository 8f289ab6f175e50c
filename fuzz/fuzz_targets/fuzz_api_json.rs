//! Fuzz target for API message decoding.
//!
//! Arbitrary bytes must decode or fail cleanly, and anything that decodes
//! must survive a re-encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sentinel_core::api::{decode_message, encode_message};

const MAX: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = decode_message(data, MAX) {
        let _ = message.operation();
        let _ = message.request_id();
        if let Ok(bytes) = encode_message(&message, usize::MAX) {
            let again = decode_message(&bytes, usize::MAX).expect("re-encoded message decodes");
            assert_eq!(again.operation(), message.operation());
        }
    }
});
