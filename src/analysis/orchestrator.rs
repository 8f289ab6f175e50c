//! Concurrent fan-out over the three analyzers.
//!
//! Each analyzer runs on the blocking pool against a shared `Arc<str>`. A
//! combined result is only produced when all three finish inside the
//! deadline; any error, panic or timeout is surfaced as an
//! [`OrchestratorError`] and the content is treated as undetermined.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::PatternCatalog;
use super::crisis::{CrisisSafetyAnalyzer, SafetyAnalysisResult};
use super::emotion::{EmotionAnalysisResult, EmotionClassifier};
use super::error::{AnalysisError, AnalyzerKind};
use super::phi::{AnalysisMode, PhiDetectionResult, PhiDetector};
use super::risk::RiskLevel;
use super::TextAnalyzer;
use crate::security::encryption::PhiCipher;
use crate::security_log;
use crate::telemetry::{
    analyzer_span, record_analysis, record_analysis_failure, record_crisis_escalation,
    SecurityEvent, SpanExt,
};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{analyzer} analyzer failed: {source}")]
    Analyzer {
        analyzer: AnalyzerKind,
        #[source]
        source: AnalysisError,
    },

    #[error("Analysis did not finish within {0:?}")]
    DeadlineExceeded(Duration),
}

impl OrchestratorError {
    fn analyzer_failed(analyzer: AnalyzerKind, source: AnalysisError) -> Self {
        Self::Analyzer { analyzer, source }
    }

    /// The analyzer that failed, when one can be named.
    pub fn analyzer(&self) -> Option<AnalyzerKind> {
        match self {
            Self::Analyzer { analyzer, .. } => Some(*analyzer),
            Self::DeadlineExceeded(_) => None,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Analyzer { source, .. } if source.is_client_error())
    }
}

/// All three results for one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedAnalysis {
    pub safety: SafetyAnalysisResult,
    pub emotion: EmotionAnalysisResult,
    pub phi: PhiDetectionResult,
    pub overall_safe: bool,
    pub processing_time_ms: f64,
}

impl CombinedAnalysis {
    fn assemble(
        safety: SafetyAnalysisResult,
        emotion: EmotionAnalysisResult,
        phi: PhiDetectionResult,
        started: Instant,
    ) -> Self {
        let overall_safe = safety.is_safe && !emotion.is_crisis && phi.compliance.is_compliant;
        Self {
            safety,
            emotion,
            phi,
            overall_safe,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

/// What a caller may conclude from a combined run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyVerdict {
    Safe,
    Unsafe,
    /// Analysis failed. Route to human review.
    Undetermined,
}

impl SafetyVerdict {
    pub fn certify(outcome: &Result<CombinedAnalysis, OrchestratorError>) -> Self {
        match outcome {
            Ok(analysis) if analysis.overall_safe => Self::Safe,
            Ok(_) => Self::Unsafe,
            Err(_) => Self::Undetermined,
        }
    }
}

type SafetyAnalyzer = Arc<dyn TextAnalyzer<Output = SafetyAnalysisResult>>;
type EmotionAnalyzer = Arc<dyn TextAnalyzer<Output = EmotionAnalysisResult>>;

pub struct SafetyOrchestrator {
    safety: SafetyAnalyzer,
    emotion: EmotionAnalyzer,
    phi: Arc<PhiDetector>,
    deadline: Duration,
}

impl SafetyOrchestrator {
    /// Standard analyzers over one catalog. Without a cipher, encrypt mode
    /// fails with `EncryptionKeyUnavailable`.
    pub fn new(catalog: Arc<PatternCatalog>, cipher: Option<Arc<PhiCipher>>) -> Self {
        let phi = match cipher {
            Some(cipher) => PhiDetector::with_cipher(catalog.clone(), cipher),
            None => PhiDetector::new(catalog.clone()),
        };
        Self::with_analyzers(
            Arc::new(CrisisSafetyAnalyzer::new(catalog.clone())),
            Arc::new(EmotionClassifier::new(catalog)),
            Arc::new(phi),
        )
    }

    pub fn with_analyzers(
        safety: SafetyAnalyzer,
        emotion: EmotionAnalyzer,
        phi: Arc<PhiDetector>,
    ) -> Self {
        Self {
            safety,
            emotion,
            phi,
            deadline: DEFAULT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run all three analyzers. PHI runs in `phi_mode`.
    pub async fn analyze_combined(
        &self,
        text: &str,
        phi_mode: AnalysisMode,
    ) -> Result<CombinedAnalysis, OrchestratorError> {
        let started = Instant::now();
        let text: Arc<str> = Arc::from(text);

        let safety = self.safety.clone();
        let emotion = self.emotion.clone();
        let phi = self.phi.clone();

        let joined = futures::future::try_join3(
            run_blocking(AnalyzerKind::Crisis, text.clone(), move |t| safety.analyze(t)),
            run_blocking(AnalyzerKind::Emotion, text.clone(), move |t| emotion.analyze(t)),
            run_blocking(AnalyzerKind::Phi, text, move |t| phi.detect(t, phi_mode)),
        );

        let outcome = match tokio::time::timeout(self.deadline, joined).await {
            Ok(Ok((safety, emotion, phi))) => {
                Ok(CombinedAnalysis::assemble(safety, emotion, phi, started))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(OrchestratorError::DeadlineExceeded(self.deadline)),
        };

        match &outcome {
            Ok(analysis) => {
                report_safety(&analysis.safety);
                report_emotion(&analysis.emotion);
                report_phi(&analysis.phi);
                tracing::debug!(
                    overall_safe = analysis.overall_safe,
                    processing_time_ms = analysis.processing_time_ms,
                    "Combined analysis complete"
                );
            }
            Err(e) => report_undetermined(e),
        }
        outcome
    }

    pub async fn analyze_safety(&self, text: &str) -> Result<SafetyAnalysisResult, OrchestratorError> {
        let safety = self.safety.clone();
        let result = self
            .bounded(run_blocking(AnalyzerKind::Crisis, Arc::from(text), move |t| {
                safety.analyze(t)
            }))
            .await;
        if let Ok(r) = &result {
            report_safety(r);
        }
        result
    }

    pub async fn analyze_emotion(
        &self,
        text: &str,
    ) -> Result<EmotionAnalysisResult, OrchestratorError> {
        let emotion = self.emotion.clone();
        let result = self
            .bounded(run_blocking(AnalyzerKind::Emotion, Arc::from(text), move |t| {
                emotion.analyze(t)
            }))
            .await;
        if let Ok(r) = &result {
            report_emotion(r);
        }
        result
    }

    pub async fn detect_phi(
        &self,
        text: &str,
        mode: AnalysisMode,
    ) -> Result<PhiDetectionResult, OrchestratorError> {
        let phi = self.phi.clone();
        let result = self
            .bounded(run_blocking(AnalyzerKind::Phi, Arc::from(text), move |t| {
                phi.detect(t, mode)
            }))
            .await;
        if let Ok(r) = &result {
            report_phi(r);
        }
        result
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, OrchestratorError>>,
    ) -> Result<T, OrchestratorError> {
        let result = match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::DeadlineExceeded(self.deadline)),
        };
        if let Err(e) = &result {
            report_undetermined(e);
        }
        result
    }
}

async fn run_blocking<T, F>(kind: AnalyzerKind, text: Arc<str>, analyze: F) -> Result<T, OrchestratorError>
where
    T: Send + 'static,
    F: FnOnce(&str) -> Result<T, AnalysisError> + Send + 'static,
{
    let started = Instant::now();
    let span = analyzer_span(kind, text.len());
    let worker_span = span.clone();
    match tokio::task::spawn_blocking(move || worker_span.in_scope(|| analyze(&text))).await {
        Ok(Ok(output)) => {
            span.record_outcome("ok");
            record_analysis(kind, started.elapsed());
            Ok(output)
        }
        Ok(Err(e)) => {
            span.record_outcome("failed");
            record_analysis_failure(kind);
            Err(OrchestratorError::analyzer_failed(kind, e))
        }
        Err(join) => {
            span.record_outcome("aborted");
            record_analysis_failure(kind);
            Err(OrchestratorError::analyzer_failed(
                kind,
                AnalysisError::Aborted(join.to_string()),
            ))
        }
    }
}

fn report_safety(result: &SafetyAnalysisResult) {
    if result.escalation_needed {
        record_crisis_escalation();
        security_log!(
            SecurityEvent::CrisisEscalation,
            "Crisis language requires escalation",
            "risk_level" => result.risk_level.as_str()
        );
    }
}

fn report_emotion(result: &EmotionAnalysisResult) {
    if result.is_crisis {
        security_log!(
            SecurityEvent::CrisisEscalation,
            "Emotional crisis indicators detected",
            "intervention_level" => result.intervention_level.as_str()
        );
    }
}

fn report_phi(result: &PhiDetectionResult) {
    if result.risk_level >= RiskLevel::Medium {
        let count = result.identifiers.len().to_string();
        security_log!(
            SecurityEvent::PhiDetected,
            "PHI detected in content",
            "risk_level" => result.risk_level.as_str(),
            "identifiers" => count.as_str(),
            "mode" => result.mode.as_str()
        );
    }
}

fn report_undetermined(error: &OrchestratorError) {
    let analyzer = error.analyzer().map(|a| a.as_str()).unwrap_or("deadline");
    let reason = error.to_string();
    security_log!(
        SecurityEvent::AnalysisUndetermined,
        "Safety could not be determined",
        "analyzer" => analyzer,
        "reason" => reason.as_str()
    );
}
