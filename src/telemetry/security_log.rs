//! Security event logging.
//!
//! Structured `tracing` events for everything an incident responder would
//! want to grep for. Never pass raw content, passwords or tokens as details.

use chrono::Utc;

/// Security event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    AuthSuccess,
    AuthFailure,
    RateLimited,
    TokenRejected,
    SessionCreated,
    SessionRevoked,
    PermissionDenied,
    /// Crisis signal that requires human escalation.
    CrisisEscalation,
    /// PHI at or above medium risk seen in analyzed content.
    PhiDetected,
    /// An analyzer failed or timed out; content could not be certified.
    AnalysisUndetermined,
    InputValidationFailure,
    AuditSinkFailure,
}

impl SecurityEvent {
    /// Get the severity level for this event.
    pub fn severity(&self) -> SecuritySeverity {
        match self {
            Self::AuthSuccess => SecuritySeverity::Info,
            Self::AuthFailure => SecuritySeverity::Warning,
            Self::RateLimited => SecuritySeverity::Warning,
            Self::TokenRejected => SecuritySeverity::Warning,
            Self::SessionCreated => SecuritySeverity::Info,
            Self::SessionRevoked => SecuritySeverity::Info,
            Self::PermissionDenied => SecuritySeverity::Warning,
            Self::CrisisEscalation => SecuritySeverity::Critical,
            Self::PhiDetected => SecuritySeverity::Warning,
            Self::AnalysisUndetermined => SecuritySeverity::Error,
            Self::InputValidationFailure => SecuritySeverity::Debug,
            Self::AuditSinkFailure => SecuritySeverity::Error,
        }
    }

    /// Get a string representation of the event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthSuccess => "auth_success",
            Self::AuthFailure => "auth_failure",
            Self::RateLimited => "rate_limited",
            Self::TokenRejected => "token_rejected",
            Self::SessionCreated => "session_created",
            Self::SessionRevoked => "session_revoked",
            Self::PermissionDenied => "permission_denied",
            Self::CrisisEscalation => "crisis_escalation",
            Self::PhiDetected => "phi_detected",
            Self::AnalysisUndetermined => "analysis_undetermined",
            Self::InputValidationFailure => "input_validation_failure",
            Self::AuditSinkFailure => "audit_sink_failure",
        }
    }
}

/// Severity levels for security events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecuritySeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl SecuritySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Format the single-line rendering used in the log message.
pub fn format_security_line(event: SecurityEvent, message: &str, details: &[(&str, &str)]) -> String {
    let details_str = details
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");

    if details_str.is_empty() {
        format!("SECURITY {} {}: {}", event.severity().as_str(), event.as_str(), message)
    } else {
        format!(
            "SECURITY {} {}: {} | {}",
            event.severity().as_str(),
            event.as_str(),
            message,
            details_str
        )
    }
}

/// Log a security event with structured data.
///
/// ```
/// use sentinel_core::telemetry::{log_security_event, SecurityEvent};
///
/// log_security_event(
///     SecurityEvent::AuthFailure,
///     "Login rejected",
///     &[("reason", "invalid_password")],
/// );
/// ```
pub fn log_security_event(event: SecurityEvent, message: &str, details: &[(&str, &str)]) {
    let line = format_security_line(event, message, details);
    let timestamp = Utc::now().to_rfc3339();
    let event_type = event.as_str();

    match event.severity() {
        SecuritySeverity::Debug => {
            tracing::debug!(security_event = event_type, %timestamp, "{}", line)
        }
        SecuritySeverity::Info => {
            tracing::info!(security_event = event_type, %timestamp, "{}", line)
        }
        SecuritySeverity::Warning => {
            tracing::warn!(security_event = event_type, %timestamp, "{}", line)
        }
        SecuritySeverity::Error | SecuritySeverity::Critical => {
            tracing::error!(security_event = event_type, %timestamp, "{}", line)
        }
    }
}

/// Convenience macro for logging security events.
#[macro_export]
macro_rules! security_log {
    ($event:expr, $message:expr) => {
        $crate::telemetry::security_log::log_security_event($event, $message, &[])
    };
    ($event:expr, $message:expr, $($key:expr => $value:expr),+ $(,)?) => {
        $crate::telemetry::security_log::log_security_event(
            $event,
            $message,
            &[$(($key, $value)),+]
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_severity() {
        assert_eq!(SecurityEvent::AuthSuccess.severity(), SecuritySeverity::Info);
        assert_eq!(SecurityEvent::AuthFailure.severity(), SecuritySeverity::Warning);
        assert_eq!(
            SecurityEvent::CrisisEscalation.severity(),
            SecuritySeverity::Critical
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(SecuritySeverity::Critical > SecuritySeverity::Error);
        assert!(SecuritySeverity::Error > SecuritySeverity::Warning);
        assert!(SecuritySeverity::Warning > SecuritySeverity::Info);
        assert!(SecuritySeverity::Info > SecuritySeverity::Debug);
    }

    #[test]
    fn test_line_format() {
        let line = format_security_line(
            SecurityEvent::PermissionDenied,
            "Role lacks permission",
            &[("role", "resident"), ("permission", "read_audit_log")],
        );
        assert_eq!(
            line,
            "SECURITY WARNING permission_denied: Role lacks permission | role=resident permission=read_audit_log"
        );
        assert_eq!(
            format_security_line(SecurityEvent::SessionCreated, "ok", &[]),
            "SECURITY INFO session_created: ok"
        );
    }

    #[test]
    fn test_macro_expands() {
        crate::security_log!(SecurityEvent::RateLimited, "Too many attempts");
        crate::security_log!(SecurityEvent::TokenRejected, "Expired", "jti" => "abc");
    }
}
