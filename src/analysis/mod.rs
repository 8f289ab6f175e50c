//! Content-safety analysis.
//!
//! Three pattern-based analyzers (crisis safety, emotion, PHI) read from one
//! immutable [`PatternCatalog`]. [`SafetyOrchestrator`] runs them together
//! under a deadline and refuses to certify anything it could not fully
//! analyze.

pub mod catalog;
pub mod crisis;
pub mod emotion;
pub mod error;
pub mod orchestrator;
pub mod phi;
pub mod risk;

pub use catalog::PatternCatalog;
pub use crisis::{CrisisSafetyAnalyzer, SafetyAnalysisResult};
pub use emotion::{
    CrisisIndicator, EmotionAnalysisResult, EmotionClassifier, EmotionLabel, EmotionScore,
    IndicatorFamily,
};
pub use error::{AnalysisError, AnalyzerKind};
pub use orchestrator::{CombinedAnalysis, OrchestratorError, SafetyOrchestrator, SafetyVerdict};
pub use phi::{
    AnalysisMode, ComplianceAssessment, PhiDetectionResult, PhiDetector, PhiIdentifier, PhiType,
};
pub use risk::{CrisisFamily, GuidelineKind, RiskLevel, Span, Violation, ViolationType};

/// A synchronous, CPU-bound analyzer over one input text.
///
/// Implementations hold no mutable state, so one instance serves every
/// request concurrently.
pub trait TextAnalyzer: Send + Sync {
    type Output: Send + 'static;

    fn kind(&self) -> AnalyzerKind;

    fn analyze(&self, text: &str) -> Result<Self::Output, AnalysisError>;
}
