//! Telemetry for the safety engine.
//!
//! Structured logging, request spans, security event logging and metrics.
//! Nothing here ships data off-host; exporters are the embedding service's job.

mod logging;
mod metrics;
pub mod security_log;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    record_analysis, record_analysis_failure, record_audit_sink_failure, record_auth_failure,
    record_crisis_escalation,
};
pub use security_log::{log_security_event, SecurityEvent, SecuritySeverity};
pub use spans::{analyzer_span, request_span, OperationClass, SpanExt};
