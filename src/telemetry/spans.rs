//! Spans for API requests and analyzer runs.
//!
//! Text under analysis never goes into a span. Analyzer spans carry the
//! input length only.

use tracing::field::Empty;
use tracing::{debug_span, info_span, Span};
use uuid::Uuid;

use crate::analysis::{AnalyzerKind, RiskLevel};

/// Family an API operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    Analysis,
    Auth,
    /// Anything that is not a request, such as a response type sent back in.
    Protocol,
}

impl OperationClass {
    pub fn of(operation: &str) -> Self {
        match operation {
            "analyze_safety" | "analyze_emotion" | "detect_phi" | "analyze_combined" => {
                Self::Analysis
            }
            "register" | "login" | "verify_token" | "refresh_token" | "logout" => Self::Auth,
            _ => Self::Protocol,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Auth => "auth",
            Self::Protocol => "protocol",
        }
    }
}

/// Span for one API request.
///
/// `principal_id`, `status_code`, `risk_level` and `latency_ms` start empty
/// and are filled in through [`SpanExt`].
pub fn request_span(request_id: &str, operation: &'static str) -> Span {
    info_span!(
        "api_request",
        request_id = %request_id,
        operation,
        class = OperationClass::of(operation).as_str(),
        principal_id = Empty,
        status_code = Empty,
        risk_level = Empty,
        latency_ms = Empty,
    )
}

/// Span for one analyzer run on the blocking pool.
pub fn analyzer_span(kind: AnalyzerKind, input_bytes: usize) -> Span {
    debug_span!(
        "analyzer",
        analyzer = kind.as_str(),
        input_bytes = input_bytes as u64,
        outcome = Empty,
    )
}

pub trait SpanExt {
    fn record_principal(&self, principal_id: &Uuid);
    fn record_status(&self, status_code: u16);
    fn record_risk(&self, level: RiskLevel);
    /// `ok`, `failed` or `aborted`.
    fn record_outcome(&self, outcome: &'static str);
}

impl SpanExt for Span {
    fn record_principal(&self, principal_id: &Uuid) {
        self.record("principal_id", principal_id.to_string().as_str());
    }

    fn record_status(&self, status_code: u16) {
        self.record("status_code", status_code);
    }

    fn record_risk(&self, level: RiskLevel) {
        self.record("risk_level", level.as_str());
    }

    fn record_outcome(&self, outcome: &'static str) {
        self.record("outcome", outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_classes() {
        assert_eq!(OperationClass::of("detect_phi"), OperationClass::Analysis);
        assert_eq!(OperationClass::of("analyze_combined"), OperationClass::Analysis);
        assert_eq!(OperationClass::of("logout"), OperationClass::Auth);
        assert_eq!(OperationClass::of("verify_token"), OperationClass::Auth);
        assert_eq!(OperationClass::of("logged_out"), OperationClass::Protocol);
        assert_eq!(OperationClass::Auth.as_str(), "auth");
    }

    #[test]
    fn test_recording_without_subscriber_is_inert() {
        let span = request_span("r-1", "login");
        span.record_principal(&Uuid::nil());
        span.record_status(401);
        span.record_risk(RiskLevel::High);

        let analyzer = analyzer_span(AnalyzerKind::Phi, 42);
        analyzer.record_outcome("ok");
    }
}
