//! Shared result vocabulary for the content analyzers.
//!
//! Severities are a closed, ordered set so aggregation can take a plain
//! `max()` and match arms stay exhaustive when a level is added.

use serde::{Deserialize, Serialize};

/// Ordered risk severity. `None < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Weight used when folding violations into a normalized risk score.
    pub fn weight(&self) -> f32 {
        match self {
            Self::None => 0.0,
            Self::Low => 0.25,
            Self::Medium => 0.5,
            Self::High => 0.75,
            Self::Critical => 1.0,
        }
    }

    /// True for `High` and `Critical`.
    pub fn is_elevated(&self) -> bool {
        *self >= Self::High
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte range into the analyzed input. Always lies on char boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl From<regex::Match<'_>> for Span {
    fn from(m: regex::Match<'_>) -> Self {
        Self::new(m.start(), m.end())
    }
}

/// Crisis pattern families checked by the safety analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisFamily {
    SuicidalIdeation,
    SelfHarm,
    Violence,
    MedicalEmergency,
}

impl CrisisFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuicidalIdeation => "suicidal_ideation",
            Self::SelfHarm => "self_harm",
            Self::Violence => "violence",
            Self::MedicalEmergency => "medical_emergency",
        }
    }
}

/// Therapeutic guideline breaches. Quality problems, not crisis signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidelineKind {
    MedicalAdvice,
    Judgmental,
}

impl GuidelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MedicalAdvice => "medical_advice",
            Self::Judgmental => "judgmental_language",
        }
    }
}

/// What kind of rule produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ViolationType {
    Crisis(CrisisFamily),
    RiskPattern(RiskLevel),
    Guideline(GuidelineKind),
}

impl ViolationType {
    pub fn is_crisis(&self) -> bool {
        matches!(self, Self::Crisis(_))
    }
}

/// A single matched rule. Overlapping violations are kept, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub violation_type: ViolationType,
    pub description: String,
    pub severity: RiskLevel,
    pub span: Span,
    pub confidence: f32,
}
