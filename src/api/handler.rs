//! Request dispatch for API messages.
//!
//! Every request is authenticated (except register and login), permission
//! checked, and answered with exactly one response message. Failures become
//! `error` messages carrying a status code and the request id.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use super::protocol::{
    decode_message, encode_response, AnalysisRequest, ApiMessage, ErrorResponse, LoginMessage,
    ProtocolError, RegisterMessage, DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::analysis::{
    AnalysisError, AnalysisMode, OrchestratorError, RiskLevel, SafetyOrchestrator, SafetyVerdict,
};
use crate::auth::{
    AuthError, AuthService, Claims, Permission, RegisterRequest, RequestContext, Role, TokenError,
};
use crate::config::DEFAULT_MAX_CONTENT_LENGTH;
use crate::security::audit::{AuditCategory, AuditEvent, AuditLogger, AuditSeverity};
use crate::security_log;
use crate::telemetry::{request_span, SecurityEvent, SpanExt};

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Analysis(#[from] OrchestratorError),

    #[error("Unexpected message type: {0}")]
    UnexpectedMessage(&'static str),
}

/// Error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Authorization,
    RateLimited,
    /// Safety could not be determined. Route to human review.
    Analysis,
    Dependency,
    Internal,
}

impl ErrorCategory {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Authentication => 401,
            Self::Authorization => 403,
            Self::RateLimited => 429,
            Self::Analysis | Self::Dependency => 503,
            Self::Internal => 500,
        }
    }
}

impl HandlerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Protocol(_) | Self::UnexpectedMessage(_) => ErrorCategory::Validation,
            Self::Auth(e) => match e {
                AuthError::InvalidCredentials | AuthError::AccountInactive => {
                    ErrorCategory::Authentication
                }
                AuthError::Token(TokenError::StoreUnavailable(_)) => ErrorCategory::Dependency,
                AuthError::Token(TokenError::InvalidKey(_) | TokenError::LifetimeOutOfRange) => {
                    ErrorCategory::Internal
                }
                AuthError::Token(_) => ErrorCategory::Authentication,
                AuthError::RateLimited { .. } => ErrorCategory::RateLimited,
                AuthError::EmailTaken | AuthError::Validation(_) => ErrorCategory::Validation,
                AuthError::Password(crate::auth::PasswordError::TooWeak { .. }) => {
                    ErrorCategory::Validation
                }
                AuthError::Password(_) => ErrorCategory::Internal,
                AuthError::Forbidden(_) | AuthError::SuperuserRequired => {
                    ErrorCategory::Authorization
                }
                AuthError::Store(_) => ErrorCategory::Dependency,
            },
            Self::Analysis(e) if e.is_client_error() => ErrorCategory::Validation,
            Self::Analysis(_) => ErrorCategory::Analysis,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Protocol(ProtocolError::MessageTooLarge { .. }) => 413,
            _ => self.category().status_code(),
        }
    }

    /// Message safe to show a client. Token and login failures stay vague.
    pub fn client_message(&self) -> String {
        match self.category() {
            ErrorCategory::Authentication => match self {
                Self::Auth(AuthError::Token(_)) => "Invalid or expired token".to_string(),
                _ => AuthError::InvalidCredentials.to_string(),
            },
            ErrorCategory::Analysis => {
                "Safety could not be determined; human review required".to_string()
            }
            ErrorCategory::Dependency => "Service temporarily unavailable".to_string(),
            ErrorCategory::Internal => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub max_content_length: usize,
    pub max_message_size: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

pub struct ApiHandler {
    orchestrator: Arc<SafetyOrchestrator>,
    auth: Arc<AuthService>,
    audit: AuditLogger,
    config: HandlerConfig,
}

impl ApiHandler {
    pub fn new(
        orchestrator: Arc<SafetyOrchestrator>,
        auth: Arc<AuthService>,
        audit: AuditLogger,
        config: HandlerConfig,
    ) -> Self {
        Self {
            orchestrator,
            auth,
            audit,
            config,
        }
    }

    /// Decode, dispatch and encode. Always produces a response body.
    pub async fn process(&self, bytes: &[u8]) -> Vec<u8> {
        let response = match decode_message(bytes, self.config.max_message_size) {
            Ok(message) => self.handle(message).await,
            Err(e) => {
                let error = HandlerError::from(e);
                tracing::warn!(error = %error, "Rejected undecodable message");
                error_message(&error, &Uuid::new_v4().to_string())
            }
        };

        match encode_response(&response, self.config.max_message_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode response");
                let request_id = response.request_id().unwrap_or_default().to_string();
                let fallback = ApiMessage::Error(ErrorResponse::new(500, "Internal error", request_id));
                serde_json::to_vec(&fallback).unwrap_or_default()
            }
        }
    }

    /// Dispatch one decoded message.
    pub async fn handle(&self, message: ApiMessage) -> ApiMessage {
        let request_id = message
            .request_id()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let operation = message.operation();
        let span = request_span(&request_id, operation);
        let started = Instant::now();

        let result = self
            .dispatch(message, &request_id)
            .instrument(span.clone())
            .await;

        span.record("latency_ms", started.elapsed().as_millis() as u64);
        span.record_status(match &result {
            Ok(ApiMessage::Registered { code, .. }) => *code,
            Ok(_) => 200,
            Err(e) => e.status_code(),
        });

        match result {
            Ok(response) => response,
            Err(e) => {
                let _enter = span.enter();
                if e.status_code() >= 500 {
                    tracing::error!(operation, error = %e, "Request failed");
                } else {
                    tracing::info!(operation, status = e.status_code(), error = %e, "Request rejected");
                }
                error_message(&e, &request_id)
            }
        }
    }

    async fn dispatch(&self, message: ApiMessage, request_id: &str) -> Result<ApiMessage, HandlerError> {
        match message {
            ApiMessage::AnalyzeSafety(req) => self.analyze_safety(req, request_id).await,
            ApiMessage::AnalyzeEmotion(req) => self.analyze_emotion(req, request_id).await,
            ApiMessage::DetectPhi(req) => self.detect_phi(req, request_id).await,
            ApiMessage::AnalyzeCombined(req) => self.analyze_combined(req, request_id).await,
            ApiMessage::Register(req) => self.register(req, request_id).await,
            ApiMessage::Login(req) => self.login(req, request_id).await,
            ApiMessage::VerifyToken { token, .. } => {
                let claims = match self.auth.verify_token(&token).await {
                    Ok(claims) => Some(claims),
                    Err(AuthError::Token(e)) if !is_unconfirmable(&e) => None,
                    Err(e) => return Err(e.into()),
                };
                Ok(ApiMessage::TokenVerification {
                    request_id: request_id.to_string(),
                    valid: claims.is_some(),
                    claims,
                })
            }
            ApiMessage::RefreshToken { refresh_token, .. } => {
                let access_token = self.auth.refresh(&refresh_token).await?;
                Ok(ApiMessage::TokenRefreshed {
                    request_id: request_id.to_string(),
                    access_token,
                    token_type: "Bearer".to_string(),
                    expires_in: self.auth.tokens().config().access_ttl.as_secs(),
                })
            }
            ApiMessage::Logout {
                token, all_sessions, ..
            } => {
                let ctx = RequestContext::new(request_id);
                let sessions_revoked = self.auth.logout(&token, all_sessions, &ctx).await?;
                Ok(ApiMessage::LoggedOut {
                    request_id: request_id.to_string(),
                    sessions_revoked,
                })
            }
            other => Err(HandlerError::UnexpectedMessage(other.operation())),
        }
    }

    /// Validate, authenticate and authorize an analysis request.
    async fn admit(
        &self,
        req: &AnalysisRequest,
        request_id: &str,
        permissions: &[Permission],
    ) -> Result<Claims, HandlerError> {
        if let Err(e) = req.validate(self.config.max_content_length) {
            security_log!(
                SecurityEvent::InputValidationFailure,
                "Analysis request rejected",
                "request_id" => request_id
            );
            return Err(e.into());
        }

        let claims = self.auth.authenticate(&req.token).await?;
        tracing::Span::current().record_principal(&claims.sub);

        let ctx = RequestContext::new(request_id);
        for permission in permissions {
            self.auth.authorize(&claims, *permission, &ctx).await?;
        }
        Ok(claims)
    }

    async fn analyze_safety(&self, req: AnalysisRequest, request_id: &str) -> Result<ApiMessage, HandlerError> {
        let claims = self.admit(&req, request_id, &[Permission::RunSafetyAnalysis]).await?;
        let outcome = self.orchestrator.analyze_safety(&req.content).await;
        let result = self.audit_outcome(&claims, &req, request_id, outcome).await?;
        tracing::Span::current().record_risk(result.risk_level);
        if result.escalation_needed {
            self.audit_crisis(&claims, &req, request_id, result.risk_level).await;
        }
        Ok(ApiMessage::SafetyResult {
            request_id: request_id.to_string(),
            result,
        })
    }

    async fn analyze_emotion(&self, req: AnalysisRequest, request_id: &str) -> Result<ApiMessage, HandlerError> {
        let claims = self.admit(&req, request_id, &[Permission::RunSafetyAnalysis]).await?;
        let outcome = self.orchestrator.analyze_emotion(&req.content).await;
        let result = self.audit_outcome(&claims, &req, request_id, outcome).await?;
        tracing::Span::current().record_risk(result.intervention_level);
        if result.is_crisis {
            self.audit_crisis(&claims, &req, request_id, result.intervention_level).await;
        }
        Ok(ApiMessage::EmotionResult {
            request_id: request_id.to_string(),
            result,
        })
    }

    async fn detect_phi(&self, req: AnalysisRequest, request_id: &str) -> Result<ApiMessage, HandlerError> {
        let mode = parse_mode(&req)?;
        let claims = self.admit(&req, request_id, &[Permission::RunPhiDetection]).await?;
        let outcome = self.orchestrator.detect_phi(&req.content, mode).await;
        let result = self.audit_outcome(&claims, &req, request_id, outcome).await?;
        tracing::Span::current().record_risk(result.risk_level);
        if result.risk_level >= RiskLevel::Medium {
            self.audit_phi(&claims, &req, request_id, result.risk_level, result.identifiers.len(), mode)
                .await;
        }
        Ok(ApiMessage::PhiResult {
            request_id: request_id.to_string(),
            result,
        })
    }

    async fn analyze_combined(&self, req: AnalysisRequest, request_id: &str) -> Result<ApiMessage, HandlerError> {
        let mode = parse_mode(&req)?;
        let claims = self
            .admit(
                &req,
                request_id,
                &[Permission::RunSafetyAnalysis, Permission::RunPhiDetection],
            )
            .await?;
        let outcome = self.orchestrator.analyze_combined(&req.content, mode).await;
        let verdict = SafetyVerdict::certify(&outcome);
        let result = self.audit_outcome(&claims, &req, request_id, outcome).await?;
        tracing::Span::current().record_risk(
            result
                .safety
                .risk_level
                .max(result.emotion.intervention_level)
                .max(result.phi.risk_level),
        );

        if result.safety.escalation_needed || result.emotion.is_crisis {
            let level = result.safety.risk_level.max(result.emotion.intervention_level);
            self.audit_crisis(&claims, &req, request_id, level).await;
        }
        if result.phi.risk_level >= RiskLevel::Medium {
            self.audit_phi(
                &claims,
                &req,
                request_id,
                result.phi.risk_level,
                result.phi.identifiers.len(),
                mode,
            )
            .await;
        }

        Ok(ApiMessage::CombinedResult {
            request_id: request_id.to_string(),
            verdict,
            result,
        })
    }

    async fn register(&self, req: RegisterMessage, request_id: &str) -> Result<ApiMessage, HandlerError> {
        let role = req.role.unwrap_or(Role::Resident);
        let ctx = RequestContext::new(request_id);

        if !role.is_self_service() {
            match &req.token {
                Some(token) => {
                    let claims = self.auth.authenticate(token).await?;
                    self.auth
                        .authorize(&claims, Permission::ManageUsers, &ctx)
                        .await?;
                }
                None => {
                    security_log!(
                        SecurityEvent::PermissionDenied,
                        "Anonymous registration of privileged role",
                        "role" => role.as_str()
                    );
                    self.audit
                        .record_built(
                            AuditEvent::builder()
                                .severity(AuditSeverity::Warning)
                                .category(AuditCategory::Authorization)
                                .action("register")
                                .message(format!("Anonymous registration as {} denied", role))
                                .resource("principal", None)
                                .correlation_id(request_id)
                                .success(false),
                        )
                        .await;
                    return Err(AuthError::Forbidden(Permission::ManageUsers.as_str().to_string()).into());
                }
            }
        }

        let profile = self
            .auth
            .register(
                RegisterRequest {
                    email: req.email,
                    password: req.password,
                    display_name: req.display_name,
                    role,
                },
                &ctx,
            )
            .await?;

        Ok(ApiMessage::Registered {
            request_id: request_id.to_string(),
            code: 201,
            profile,
        })
    }

    async fn login(&self, req: LoginMessage, request_id: &str) -> Result<ApiMessage, HandlerError> {
        let ctx = RequestContext {
            request_id: request_id.to_string(),
            client: req.client.unwrap_or_default(),
        };
        let outcome = self.auth.login(&req.email, &req.password, &ctx).await?;
        tracing::Span::current().record("principal_id", outcome.profile.id.to_string().as_str());
        Ok(ApiMessage::LoggedIn {
            request_id: request_id.to_string(),
            profile: outcome.profile,
            session_id: outcome.session_id,
            tokens: outcome.tokens,
        })
    }

    /// Audit an undetermined analysis before surfacing it.
    async fn audit_outcome<T>(
        &self,
        claims: &Claims,
        req: &AnalysisRequest,
        request_id: &str,
        outcome: Result<T, OrchestratorError>,
    ) -> Result<T, HandlerError> {
        match outcome {
            Ok(result) => Ok(result),
            Err(e) => {
                if !e.is_client_error() {
                    let analyzer = e.analyzer().map(|a| a.as_str()).unwrap_or("deadline");
                    self.audit
                        .record_built(
                            analysis_event(claims, req, request_id)
                                .severity(AuditSeverity::Error)
                                .category(AuditCategory::SafetyAnalysis)
                                .action("analysis_undetermined")
                                .message("Content could not be certified; human review required")
                                .metadata("analyzer", analyzer)
                                .success(false),
                        )
                        .await;
                }
                Err(e.into())
            }
        }
    }

    async fn audit_crisis(&self, claims: &Claims, req: &AnalysisRequest, request_id: &str, level: RiskLevel) {
        self.audit
            .record_built(
                analysis_event(claims, req, request_id)
                    .severity(AuditSeverity::Critical)
                    .category(AuditCategory::SafetyAnalysis)
                    .action("crisis_escalation")
                    .message("Crisis escalation required")
                    .metadata("risk_level", level.as_str())
                    .success(true),
            )
            .await;
    }

    async fn audit_phi(
        &self,
        claims: &Claims,
        req: &AnalysisRequest,
        request_id: &str,
        level: RiskLevel,
        identifiers: usize,
        mode: AnalysisMode,
    ) {
        self.audit
            .record_built(
                analysis_event(claims, req, request_id)
                    .severity(AuditSeverity::Warning)
                    .category(AuditCategory::PhiDisclosure)
                    .action("phi_detected")
                    .message("PHI detected in submitted content")
                    .metadata("risk_level", level.as_str())
                    .metadata("identifiers", identifiers.to_string())
                    .metadata("mode", mode.as_str())
                    .success(true),
            )
            .await;
    }
}

fn analysis_event(
    claims: &Claims,
    req: &AnalysisRequest,
    request_id: &str,
) -> crate::security::audit::AuditEventBuilder {
    let mut builder = AuditEvent::builder()
        .actor(claims.sub.to_string())
        .resource("content", req.session_id.clone())
        .correlation_id(request_id);
    if let Some(user_id) = &req.user_id {
        builder = builder.metadata("subject_user_id", user_id.clone());
    }
    if let Some(purpose) = req
        .user_context
        .as_ref()
        .and_then(|c| c.get("purpose"))
        .and_then(|p| p.as_str())
    {
        builder = builder.purpose(purpose);
    }
    builder
}

/// Failures that mean validity could not be checked, not that the token is bad.
fn is_unconfirmable(error: &TokenError) -> bool {
    matches!(error, TokenError::StoreUnavailable(_) | TokenError::InvalidKey(_))
}

fn parse_mode(req: &AnalysisRequest) -> Result<AnalysisMode, HandlerError> {
    match req.analysis_mode.as_deref() {
        None => Ok(AnalysisMode::Detect),
        Some(raw) => raw.parse::<AnalysisMode>().map_err(|e: AnalysisError| {
            HandlerError::Protocol(ProtocolError::InvalidFormat(e.to_string()))
        }),
    }
}

fn error_message(error: &HandlerError, request_id: &str) -> ApiMessage {
    ApiMessage::Error(ErrorResponse::new(
        error.status_code(),
        error.client_message(),
        request_id,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StoreError;
    use std::time::Duration;

    #[test]
    fn test_status_codes() {
        let cases: Vec<(HandlerError, u16)> = vec![
            (ProtocolError::MissingField("content".into()).into(), 400),
            (
                ProtocolError::MessageTooLarge { size: 10, max: 5 }.into(),
                413,
            ),
            (AuthError::InvalidCredentials.into(), 401),
            (AuthError::Token(TokenError::Expired).into(), 401),
            (AuthError::Token(TokenError::StoreUnavailable("down".into())).into(), 503),
            (AuthError::RateLimited { retry_after_secs: 60 }.into(), 429),
            (AuthError::Forbidden("run_phi_detection".into()).into(), 403),
            (AuthError::SuperuserRequired.into(), 403),
            (AuthError::EmailTaken.into(), 400),
            (AuthError::Store(StoreError::Timeout(Duration::from_secs(2))).into(), 503),
            (
                OrchestratorError::DeadlineExceeded(Duration::from_secs(2)).into(),
                503,
            ),
            (
                OrchestratorError::Analyzer {
                    analyzer: crate::analysis::AnalyzerKind::Phi,
                    source: AnalysisError::InvalidMode("zip".into()),
                }
                .into(),
                400,
            ),
            (HandlerError::UnexpectedMessage("safety_result"), 400),
        ];
        for (error, code) in cases {
            assert_eq!(error.status_code(), code, "{}", error);
        }
    }

    #[test]
    fn test_client_messages_stay_vague() {
        let inactive: HandlerError = AuthError::AccountInactive.into();
        assert_eq!(inactive.client_message(), "Invalid credentials");

        let revoked: HandlerError = AuthError::Token(TokenError::Revoked).into();
        assert_eq!(revoked.client_message(), "Invalid or expired token");

        let undetermined: HandlerError =
            OrchestratorError::DeadlineExceeded(Duration::from_secs(1)).into();
        assert!(undetermined.client_message().contains("human review"));
    }
}
