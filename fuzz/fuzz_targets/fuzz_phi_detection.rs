//! Fuzz target for PHI detection and redaction.
//!
//! Arbitrary text must never panic the detector, and redaction must never
//! leave a high-confidence identifier in the output.

#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use sentinel_core::analysis::{AnalysisMode, PatternCatalog, PhiDetector};

static DETECTOR: OnceLock<PhiDetector> = OnceLock::new();

fuzz_target!(|data: &str| {
    let detector = DETECTOR.get_or_init(|| PhiDetector::new(PatternCatalog::shared().unwrap()));

    let result = detector.detect(data, AnalysisMode::Redact).unwrap();
    assert_eq!(
        detector.contains_phi(data),
        result.contains_phi(),
        "contains_phi inconsistent with detect"
    );

    let redacted = result.redacted_text.expect("redact mode returns text");
    for id in result.identifiers.iter().filter(|id| id.confidence > 0.6) {
        assert!(
            !redacted.contains(&id.value),
            "identifier survived redaction"
        );
    }

    // Encrypt without a key is always refused
    assert!(detector.detect(data, AnalysisMode::Encrypt).is_err());
});
