//! Analysis error types.
//!
//! All errors are fail-closed: a caller that receives one must treat the
//! content as "safety could not be determined", never as safe.

use thiserror::Error;

use crate::security::encryption::EncryptionError;

/// Which analyzer produced a result or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    Crisis,
    Emotion,
    Phi,
}

impl AnalyzerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crisis => "crisis",
            Self::Emotion => "emotion",
            Self::Phi => "phi",
        }
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a single analyzer.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Pattern catalog failed to compile {family}: {reason}")]
    PatternCompile { family: &'static str, reason: String },

    #[error("Invalid analysis mode: {0}")]
    InvalidMode(String),

    #[error("PHI encryption key unavailable")]
    EncryptionKeyUnavailable,

    #[error("PHI encryption failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Analyzer task aborted: {0}")]
    Aborted(String),
}

impl AnalysisError {
    /// Client errors are the caller's fault; everything else is a system error.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidMode(_))
    }
}
