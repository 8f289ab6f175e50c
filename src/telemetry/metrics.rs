//! Metric emission through the `metrics` facade.
//!
//! The crate never installs a recorder. Without one these calls are no-ops.

use std::time::Duration;

use crate::analysis::AnalyzerKind;

pub const ANALYSIS_TOTAL: &str = "sentinel_analysis_total";
pub const ANALYSIS_FAILURES_TOTAL: &str = "sentinel_analysis_failures_total";
pub const ANALYSIS_DURATION_MS: &str = "sentinel_analysis_duration_ms";
pub const CRISIS_ESCALATIONS_TOTAL: &str = "sentinel_crisis_escalations_total";
pub const AUTH_FAILURES_TOTAL: &str = "sentinel_auth_failures_total";
pub const AUDIT_SINK_FAILURES_TOTAL: &str = "sentinel_audit_sink_failures_total";

/// Record a completed analyzer run.
pub fn record_analysis(analyzer: AnalyzerKind, elapsed: Duration) {
    metrics::counter!(ANALYSIS_TOTAL, "analyzer" => analyzer.as_str()).increment(1);
    metrics::histogram!(ANALYSIS_DURATION_MS, "analyzer" => analyzer.as_str())
        .record(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_analysis_failure(analyzer: AnalyzerKind) {
    metrics::counter!(ANALYSIS_FAILURES_TOTAL, "analyzer" => analyzer.as_str()).increment(1);
}

pub fn record_crisis_escalation() {
    metrics::counter!(CRISIS_ESCALATIONS_TOTAL).increment(1);
}

/// `reason` is the internal audit reason, never shown to clients.
pub fn record_auth_failure(reason: &'static str) {
    metrics::counter!(AUTH_FAILURES_TOTAL, "reason" => reason).increment(1);
}

pub fn record_audit_sink_failure() {
    metrics::counter!(AUDIT_SINK_FAILURES_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emission_without_recorder_is_noop() {
        record_analysis(AnalyzerKind::Phi, Duration::from_millis(3));
        record_analysis_failure(AnalyzerKind::Crisis);
        record_crisis_escalation();
        record_auth_failure("invalid_password");
        record_audit_sink_failure();
    }
}
