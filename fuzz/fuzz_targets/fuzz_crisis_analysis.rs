//! Fuzz target for the crisis and emotion analyzers.

#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use sentinel_core::analysis::{
    CrisisSafetyAnalyzer, EmotionClassifier, PatternCatalog, RiskLevel,
};

static ANALYZERS: OnceLock<(CrisisSafetyAnalyzer, EmotionClassifier)> = OnceLock::new();

fuzz_target!(|data: &str| {
    let (crisis, emotion) = ANALYZERS.get_or_init(|| {
        let catalog = PatternCatalog::shared().unwrap();
        (
            CrisisSafetyAnalyzer::new(catalog.clone()),
            EmotionClassifier::new(catalog),
        )
    });

    let safety = crisis.evaluate(data);
    assert!((0.0..=1.0).contains(&safety.risk_score));
    if safety.escalation_needed {
        assert!(!safety.is_safe);
        assert_eq!(safety.risk_level, RiskLevel::Critical);
    }
    for v in &safety.violations {
        assert!(v.span.end <= data.len());
    }

    let result = emotion.classify(data);
    assert!((0.0..=1.0).contains(&result.confidence));
    if result.is_crisis {
        assert!(!result.crisis_indicators.is_empty());
    }
    for indicator in &result.crisis_indicators {
        assert!((0.0..=1.0).contains(&indicator.confidence));
    }
    assert_eq!(result.is_crisis, result.intervention_level > RiskLevel::None);
});
