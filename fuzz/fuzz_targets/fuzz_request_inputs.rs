//! Fuzz testing for attacker-controlled request inputs.
//!
//! Everything a client sends that reaches pure code is exercised here: the
//! presented token, the request path and served HTML. None of these may panic
//! on any input.
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! # Install cargo-fuzz (requires nightly)
//! cargo +nightly install cargo-fuzz
//!
//! # Run the target
//! cargo +nightly fuzz run fuzz_request_inputs
//!
//! # Run with a time limit (e.g., 60 seconds)
//! cargo +nightly fuzz run fuzz_request_inputs -- -max_total_time=60
//! ```
//!
//! # What This Tests
//!
//! - `Secret::is_valid`: arbitrary bytes as a presented token
//! - `sanitize_request_path`: arbitrary strings as a request path
//! - `inject_link_interceptor`: arbitrary strings as an HTML document

#![no_main]

use libfuzzer_sys::fuzz_target;
use preview_server::Secret;
use preview_server::files::sanitize_request_path;
use preview_server::middleware::{LINK_INTERCEPTOR_SCRIPT, inject_link_interceptor};

fuzz_target!(|data: &[u8]| {
    let secret = Secret::new("abc123");
    assert_eq!(secret.is_valid(data), data == b"abc123");

    if let Ok(s) = std::str::from_utf8(data) {
        // Accepted paths never climb out of the root or expose dotfiles
        if let Some(relative) = sanitize_request_path(s) {
            assert!(relative.is_relative());
            for component in relative.components() {
                assert!(!component.as_os_str().to_string_lossy().starts_with('.'));
            }
        }

        let rewritten = inject_link_interceptor(s);
        assert_eq!(rewritten.len(), s.len() + LINK_INTERCEPTOR_SCRIPT.len());
        assert!(rewritten.contains(LINK_INTERCEPTOR_SCRIPT));
    }
});
