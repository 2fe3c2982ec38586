#![no_main]

use libfuzzer_sys::fuzz_target;
use pmbot_review::{parse_review, parse_security_scan, ParsedReview};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    match parse_review(&raw) {
        ParsedReview::Structured { summary, .. } => assert!(!summary.is_empty()),
        ParsedReview::Freeform { text } => assert_eq!(text, raw.trim()),
    }
    let scan = parse_security_scan(&raw);
    assert_eq!(scan.text, raw.trim());
});
