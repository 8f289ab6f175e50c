//! Crisis safety analysis.
//!
//! Three independent passes over the input:
//! 1. crisis families (suicidal ideation, self-harm, violence, medical emergency)
//! 2. general risk phrasing at high/medium/low intensity
//! 3. therapeutic guideline breaches (medical advice, judgmental language)
//!
//! Every match becomes a `Violation`. Nothing is deduplicated; aggregation
//! takes the worst severity and a diminishing-returns weighted score.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::catalog::PatternCatalog;
use super::error::{AnalysisError, AnalyzerKind};
use super::risk::{CrisisFamily, GuidelineKind, RiskLevel, Span, Violation, ViolationType};
use super::TextAnalyzer;

/// Confidence assigned to every crisis-family match.
pub const CRISIS_CONFIDENCE: f32 = 0.9;
/// Reported when no violation fired.
pub const NO_VIOLATION_CONFIDENCE: f32 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAnalysisResult {
    pub is_safe: bool,
    pub risk_level: RiskLevel,
    pub violations: Vec<Violation>,
    pub overall_confidence: f32,
    pub risk_score: f32,
    pub recommendations: Vec<String>,
    pub requires_intervention: bool,
    pub escalation_needed: bool,
}

const CRISIS_SOURCES: &[(CrisisFamily, &str)] = &[
    (
        CrisisFamily::SuicidalIdeation,
        r"(?i)\b(?:kill myself|end my life|end it all|want to die|wanna die|suicide|suicidal|take my own life|better off dead|no reason to live|don't want to (?:live|be alive))\b",
    ),
    (
        CrisisFamily::SelfHarm,
        r"(?i)\b(?:hurt myself|harm myself|cut myself|cutting myself|self[- ]harm|burn myself|starve myself|overdose)\b",
    ),
    (
        CrisisFamily::Violence,
        r"(?i)\b(?:kill (?:him|her|them|you|someone)|hurt (?:him|her|them|you|someone)|hits? me|beats? me|beating me|attacked me|threaten(?:s|ed|ing)? (?:me|to)|abus(?:e|es|ed|ing) me|shoot|stab)\b",
    ),
    (
        CrisisFamily::MedicalEmergency,
        r"(?i)\b(?:chest pain|can't breathe|cannot breathe|trouble breathing|heart attack|having a stroke|fell and can't get up|unconscious|bleeding heavily|seizure|call 911|emergency)\b",
    ),
];

const RISK_SOURCES: &[(RiskLevel, f32, &str)] = &[
    (
        RiskLevel::High,
        0.8,
        r"(?i)\b(?:hopeless|severe(?:ly)? depress(?:ed|ion)|can't go on|cannot go on|can't take it anymore|no point (?:in )?(?:living|anything)|worthless|giving up)\b",
    ),
    (
        RiskLevel::Medium,
        0.7,
        r"(?i)\b(?:overwhelmed|trouble sleeping|can't sleep|cannot sleep|insomnia|lonely|alone|isolated|nobody visits|no one visits|depressed|exhausted|stressed out|panic)\b",
    ),
    (
        RiskLevel::Low,
        0.6,
        r"(?i)\b(?:worried|worry|sad|nervous|feeling down|upset|tired|anxious|stressed)\b",
    ),
];

const GUIDELINE_SOURCES: &[(GuidelineKind, RiskLevel, f32, &str)] = &[
    (
        GuidelineKind::MedicalAdvice,
        RiskLevel::Medium,
        0.75,
        r"(?i)\b(?:you (?:should|need to|must) (?:take|stop taking|increase|decrease|double) (?:your )?(?:medication|meds|dose|pills)|you (?:have|probably have|might have) (?:depression|dementia|cancer|diabetes|an? \w+ disorder)|i diagnose|i prescribe|stop taking your|you don't need (?:your )?(?:medication|meds|a doctor))\b",
    ),
    (
        GuidelineKind::Judgmental,
        RiskLevel::Medium,
        0.7,
        r"(?i)\b(?:just get over it|get over it|snap out of it|stop (?:complaining|whining)|you're overreacting|you are overreacting|it's all in your head|man up|toughen up|what's wrong with you)\b",
    ),
];

pub struct CrisisPatterns {
    families: Vec<(CrisisFamily, Regex)>,
    risk: Vec<(RiskLevel, f32, Regex)>,
    guidelines: Vec<(GuidelineKind, RiskLevel, f32, Regex)>,
}

impl CrisisPatterns {
    pub fn compile() -> Result<Self, AnalysisError> {
        let families = CRISIS_SOURCES
            .iter()
            .map(|(family, src)| compile_one("crisis", src).map(|re| (*family, re)))
            .collect::<Result<Vec<_>, _>>()?;
        let risk = RISK_SOURCES
            .iter()
            .map(|(level, conf, src)| compile_one("risk", src).map(|re| (*level, *conf, re)))
            .collect::<Result<Vec<_>, _>>()?;
        let guidelines = GUIDELINE_SOURCES
            .iter()
            .map(|(kind, level, conf, src)| {
                compile_one("guideline", src).map(|re| (*kind, *level, *conf, re))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            families,
            risk,
            guidelines,
        })
    }

    pub fn len(&self) -> usize {
        self.families.len() + self.risk.len() + self.guidelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn compile_one(family: &'static str, source: &str) -> Result<Regex, AnalysisError> {
    Regex::new(source).map_err(|e| AnalysisError::PatternCompile {
        family,
        reason: e.to_string(),
    })
}

pub struct CrisisSafetyAnalyzer {
    catalog: Arc<PatternCatalog>,
}

impl CrisisSafetyAnalyzer {
    pub fn new(catalog: Arc<PatternCatalog>) -> Self {
        Self { catalog }
    }

    pub fn evaluate(&self, text: &str) -> SafetyAnalysisResult {
        let violations = self.collect_violations(text);

        let risk_level = violations
            .iter()
            .map(|v| v.severity)
            .max()
            .unwrap_or(RiskLevel::None);
        let escalation_needed = violations
            .iter()
            .any(|v| v.violation_type.is_crisis() || v.severity == RiskLevel::Critical);
        let is_safe = risk_level <= RiskLevel::Low && !escalation_needed;
        let requires_intervention = risk_level.is_elevated();

        let overall_confidence = violations
            .iter()
            .map(|v| v.confidence)
            .reduce(f32::max)
            .unwrap_or(NO_VIOLATION_CONFIDENCE);

        SafetyAnalysisResult {
            is_safe,
            risk_level,
            risk_score: risk_score(&violations),
            recommendations: recommendations(&violations),
            overall_confidence,
            requires_intervention,
            escalation_needed,
            violations,
        }
    }

    fn collect_violations(&self, text: &str) -> Vec<Violation> {
        let patterns = &self.catalog.crisis;
        let mut violations = Vec::new();

        for (family, regex) in patterns.families.iter() {
            for m in regex.find_iter(text) {
                violations.push(Violation {
                    violation_type: ViolationType::Crisis(*family),
                    description: format!("Crisis language ({}): \"{}\"", family.as_str(), m.as_str()),
                    severity: RiskLevel::Critical,
                    span: Span::from(m),
                    confidence: CRISIS_CONFIDENCE,
                });
            }
        }

        for (level, confidence, regex) in patterns.risk.iter() {
            for m in regex.find_iter(text) {
                violations.push(Violation {
                    violation_type: ViolationType::RiskPattern(*level),
                    description: format!("{} risk phrasing: \"{}\"", level.as_str(), m.as_str()),
                    severity: *level,
                    span: Span::from(m),
                    confidence: *confidence,
                });
            }
        }

        for (kind, level, confidence, regex) in patterns.guidelines.iter() {
            for m in regex.find_iter(text) {
                violations.push(Violation {
                    violation_type: ViolationType::Guideline(*kind),
                    description: format!("Guideline violation ({}): \"{}\"", kind.as_str(), m.as_str()),
                    severity: *level,
                    span: Span::from(m),
                    confidence: *confidence,
                });
            }
        }

        violations
    }
}

impl TextAnalyzer for CrisisSafetyAnalyzer {
    type Output = SafetyAnalysisResult;

    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::Crisis
    }

    fn analyze(&self, text: &str) -> Result<SafetyAnalysisResult, AnalysisError> {
        Ok(self.evaluate(text))
    }
}

/// Σ weight(severity)·confidence / (n + 1), capped at 1.
fn risk_score(violations: &[Violation]) -> f32 {
    if violations.is_empty() {
        return 0.0;
    }
    let total: f32 = violations
        .iter()
        .map(|v| v.severity.weight() * v.confidence)
        .sum();
    (total / (violations.len() as f32 + 1.0)).min(1.0)
}

const CRISIS_RECOMMENDATIONS: &[&str] = &[
    "Contact the 988 Suicide & Crisis Lifeline or emergency services immediately",
    "Notify the care team for urgent human follow-up",
    "Stay engaged and do not end the conversation abruptly",
];
const HIGH_RISK_RECOMMENDATIONS: &[&str] = &[
    "Schedule a same-day wellbeing check with care staff",
    "Offer connection to a mental health professional",
];
const MEDIUM_RISK_RECOMMENDATIONS: &[&str] = &[
    "Increase check-in frequency",
    "Suggest supportive activities and social contact",
];
const LOW_RISK_RECOMMENDATIONS: &[&str] = &[
    "Continue supportive conversation",
    "Acknowledge the concern and offer reassurance",
];
const MEDICAL_ADVICE_RECOMMENDATIONS: &[&str] =
    &["Avoid medical advice language; refer clinical questions to a healthcare provider"];
const JUDGMENTAL_RECOMMENDATIONS: &[&str] =
    &["Avoid judgmental language; respond with validation and empathy"];

/// Templates for every bucket that fired, in a fixed bucket order, deduplicated.
fn recommendations(violations: &[Violation]) -> Vec<String> {
    let fired = |pred: &dyn Fn(&ViolationType) -> bool| {
        violations.iter().any(|v| pred(&v.violation_type))
    };

    let buckets: [(bool, &[&str]); 6] = [
        (fired(&|t| t.is_crisis()), CRISIS_RECOMMENDATIONS),
        (
            fired(&|t| *t == ViolationType::RiskPattern(RiskLevel::High)),
            HIGH_RISK_RECOMMENDATIONS,
        ),
        (
            fired(&|t| *t == ViolationType::RiskPattern(RiskLevel::Medium)),
            MEDIUM_RISK_RECOMMENDATIONS,
        ),
        (
            fired(&|t| *t == ViolationType::RiskPattern(RiskLevel::Low)),
            LOW_RISK_RECOMMENDATIONS,
        ),
        (
            fired(&|t| *t == ViolationType::Guideline(GuidelineKind::MedicalAdvice)),
            MEDICAL_ADVICE_RECOMMENDATIONS,
        ),
        (
            fired(&|t| *t == ViolationType::Guideline(GuidelineKind::Judgmental)),
            JUDGMENTAL_RECOMMENDATIONS,
        ),
    ];

    let mut out: Vec<String> = Vec::new();
    for (_, templates) in buckets.iter().filter(|(hit, _)| *hit) {
        for template in templates.iter() {
            if !out.iter().any(|existing| existing == template) {
                out.push(template.to_string());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> CrisisSafetyAnalyzer {
        CrisisSafetyAnalyzer::new(Arc::new(PatternCatalog::build().unwrap()))
    }

    #[test]
    fn test_suicidal_statement_is_critical() {
        let result = analyzer().evaluate("I want to kill myself");
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert!(result.escalation_needed);
        assert!(!result.is_safe);
        assert!(result.requires_intervention);
        assert!(result.recommendations[0].contains("988"));
    }

    #[test]
    fn test_mild_worry_is_low_and_safe() {
        let result = analyzer().evaluate("I'm a little worried about my appointment");
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(result.is_safe);
        assert!(!result.requires_intervention);
        assert!(!result.escalation_needed);
    }

    #[test]
    fn test_clean_text() {
        let result = analyzer().evaluate("We played cards after lunch");
        assert!(result.violations.is_empty());
        assert_eq!(result.risk_level, RiskLevel::None);
        assert_eq!(result.risk_score, 0.0);
        assert_eq!(result.overall_confidence, NO_VIOLATION_CONFIDENCE);
        assert!(result.is_safe);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_risk_score_formula() {
        // One medium (0.5 * 0.7) => 0.35 / 2
        let result = analyzer().evaluate("I have been so overwhelmed");
        assert_eq!(result.violations.len(), 1);
        assert!((result.risk_score - 0.175).abs() < 1e-6);
    }

    #[test]
    fn test_overlapping_violations_are_kept() {
        // "hopeless" is both a high risk phrase; "alone" and "nobody visits" medium
        let result = analyzer().evaluate("I feel hopeless and alone, nobody visits me");
        assert_eq!(result.risk_level, RiskLevel::High);
        assert_eq!(result.violations.len(), 3);
        assert!(!result.is_safe);
        assert!(result.requires_intervention);
        assert!(!result.escalation_needed);
    }

    #[test]
    fn test_guideline_and_crisis_recommendations_combine() {
        let result =
            analyzer().evaluate("Just get over it. Also you should stop taking your medication. I want to die");
        let recs = result.recommendations.join("\n");
        assert!(recs.contains("988"));
        assert!(recs.contains("medical advice"));
        assert!(recs.contains("judgmental"));
        assert!(result
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::Guideline(GuidelineKind::Judgmental)));
    }

    #[test]
    fn test_guideline_alone_is_not_safe() {
        let result = analyzer().evaluate("Honestly, just get over it");
        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert!(!result.is_safe);
        assert!(!result.escalation_needed);
    }

    #[test]
    fn test_risk_score_capped() {
        let text = "I want to die. kill myself. end my life. suicide. ".repeat(50);
        let result = analyzer().evaluate(&text);
        assert!(result.risk_score <= 1.0);
        assert!(result.risk_score > 0.8);
    }

    #[test]
    fn test_recommendations_deduplicated() {
        let result = analyzer().evaluate("worried, worried, so worried");
        assert_eq!(result.recommendations.len(), LOW_RISK_RECOMMENDATIONS.len());
    }
}
