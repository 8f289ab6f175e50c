//! Auth endpoints composed from the hasher, token service, permission table
//! and collaborator stores.
//!
//! Login failures are reported to the caller as `InvalidCredentials` only.
//! The distinct reason goes to the audit record, the security log and the
//! failure counter. An unknown email still pays one KDF run against a decoy
//! hash, so response time does not reveal whether an account exists.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::error::{AuthError, PasswordError, TokenError};
use super::identity::{IdentityStore, Principal, PublicProfile};
use super::password::{validate_password_strength, PasswordHasher};
use super::permissions::{Permission, PermissionEngine, Role};
use super::session::{ClientMetadata, Session, SessionStore};
use super::store::{with_retry, with_timeout, RetryPolicy, StoreError};
use super::throttle::LoginThrottle;
use super::token::{Claims, TokenPair, TokenService, TokenType};
use crate::security::audit::{AuditCategory, AuditEvent, AuditLogger, AuditSeverity};
use crate::security_log;
use crate::telemetry::{record_auth_failure, SecurityEvent};

/// Per-request details threaded into audit records.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub request_id: String,
    pub client: ClientMetadata,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client: ClientMetadata::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub profile: PublicProfile,
    pub session_id: Uuid,
    pub tokens: TokenPair,
}

/// Internal login failure reasons recorded in audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginFailure {
    UserNotFound,
    InvalidPassword,
    AccountInactive,
}

impl LoginFailure {
    fn as_str(&self) -> &'static str {
        match self {
            Self::UserNotFound => "user_not_found",
            Self::InvalidPassword => "invalid_password",
            Self::AccountInactive => "account_inactive",
        }
    }
}

pub struct AuthService {
    hasher: PasswordHasher,
    tokens: TokenService,
    permissions: PermissionEngine,
    identities: Arc<dyn IdentityStore>,
    sessions: Arc<dyn SessionStore>,
    audit: AuditLogger,
    throttle: LoginThrottle,
    retry: RetryPolicy,
    session_ttl: Duration,
    /// Hash of a random secret under the configured params.
    decoy_hash: String,
}

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub throttle_records: usize,
    pub blacklist_entries: usize,
    pub sessions: usize,
}

impl AuthService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hasher: PasswordHasher,
        tokens: TokenService,
        permissions: PermissionEngine,
        identities: Arc<dyn IdentityStore>,
        sessions: Arc<dyn SessionStore>,
        audit: AuditLogger,
        throttle: LoginThrottle,
        retry: RetryPolicy,
    ) -> Result<Self, PasswordError> {
        let session_ttl = tokens.config().refresh_ttl;
        let decoy_hash = hasher.hash(&Uuid::new_v4().to_string())?;
        Ok(Self {
            hasher,
            tokens,
            permissions,
            identities,
            sessions,
            audit,
            throttle,
            retry,
            session_ttl,
            decoy_hash,
        })
    }

    pub fn permissions(&self) -> &PermissionEngine {
        &self.permissions
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create a principal. Email is normalized to lowercase.
    pub async fn register(
        &self,
        request: RegisterRequest,
        ctx: &RequestContext,
    ) -> Result<PublicProfile, AuthError> {
        self.create_principal(request, false, ctx).await
    }

    /// Create an active system-admin superuser. Used to bootstrap a
    /// deployment; never reachable from the message protocol.
    pub async fn provision_superuser(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<PublicProfile, AuthError> {
        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            display_name: None,
            role: Role::SystemAdmin,
        };
        self.create_principal(request, true, ctx).await
    }

    async fn create_principal(
        &self,
        request: RegisterRequest,
        is_superuser: bool,
        ctx: &RequestContext,
    ) -> Result<PublicProfile, AuthError> {
        let email = normalize_email(&request.email)?;
        validate_password_strength(&request.password)?;

        let password_hash = self.hasher.hash_blocking(request.password).await?;
        let principal = Principal {
            id: Uuid::new_v4(),
            email,
            display_name: request.display_name,
            role: request.role,
            is_active: true,
            is_superuser,
            created_at: Utc::now(),
            last_login: None,
            password_hash,
        };

        let created = match with_timeout(
            self.retry.timeout,
            self.identities.create_principal(principal),
        )
        .await
        {
            Ok(p) => p,
            Err(StoreError::Conflict(_)) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        };

        let profile = created.public_profile();
        self.audit
            .record_built(
                AuditEvent::builder()
                    .severity(AuditSeverity::Info)
                    .category(AuditCategory::Authentication)
                    .action("register")
                    .message("Principal registered")
                    .actor(created.id.to_string())
                    .resource("principal", Some(created.id.to_string()))
                    .after(serde_json::json!({
                        "role": created.role,
                        "email": created.email,
                        "is_superuser": created.is_superuser,
                    }))
                    .client(&ctx.client)
                    .correlation_id(ctx.request_id.clone())
                    .success(true),
            )
            .await;

        tracing::info!(
            principal_id = %created.id,
            role = %created.role,
            is_superuser = created.is_superuser,
            "Principal registered"
        );
        Ok(profile)
    }

    /// Verify credentials, open a session and issue a token pair.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<LoginOutcome, AuthError> {
        let email = email.trim().to_lowercase();

        if let Err(retry_after) = self.throttle.check(&email) {
            record_auth_failure("rate_limited");
            security_log!(SecurityEvent::RateLimited, "Login attempt while locked out");
            self.audit_login(None, false, Some("rate_limited"), ctx).await;
            return Err(AuthError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        let lookup = with_retry(&self.retry, "get_by_email", || {
            self.identities.get_by_email(&email)
        })
        .await?;

        let principal = match lookup {
            Some(p) => p,
            None => {
                if let Err(e) = self
                    .hasher
                    .verify_blocking(password.to_string(), self.decoy_hash.clone())
                    .await
                {
                    tracing::warn!(error = %e, "Decoy verification failed");
                }
                return Err(self.fail_login(&email, None, LoginFailure::UserNotFound, ctx).await);
            }
        };

        let verified = self
            .hasher
            .verify_blocking(password.to_string(), principal.password_hash.clone())
            .await?;
        if !verified {
            return Err(self
                .fail_login(&email, Some(principal.id), LoginFailure::InvalidPassword, ctx)
                .await);
        }
        if !principal.is_active {
            return Err(self
                .fail_login(&email, Some(principal.id), LoginFailure::AccountInactive, ctx)
                .await);
        }

        self.throttle.reset(&email);

        let ttl = chrono::Duration::from_std(self.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(7));
        let session = Session::new(principal.id, ttl, ctx.client.clone());
        let session_id = session.id;
        with_timeout(self.retry.timeout, self.sessions.create_session(session)).await?;

        let tokens = self.tokens.issue_pair(&principal, session_id)?;

        let now = Utc::now();
        if let Err(e) = with_timeout(
            self.retry.timeout,
            self.identities.update_last_login(principal.id, now),
        )
        .await
        {
            tracing::warn!(principal_id = %principal.id, error = %e, "Failed to record last login");
        }

        if self.hasher.needs_rehash(&principal.password_hash).unwrap_or(false) {
            tracing::info!(principal_id = %principal.id, "Stored password hash uses outdated parameters");
        }

        let principal_id = principal.id.to_string();
        security_log!(SecurityEvent::AuthSuccess, "Login succeeded", "principal_id" => principal_id.as_str());
        security_log!(SecurityEvent::SessionCreated, "Session opened", "principal_id" => principal_id.as_str());
        self.audit_login(Some(principal.id), true, None, ctx).await;

        Ok(LoginOutcome {
            profile: principal.public_profile(),
            session_id,
            tokens,
        })
    }

    async fn fail_login(
        &self,
        email: &str,
        principal_id: Option<Uuid>,
        reason: LoginFailure,
        ctx: &RequestContext,
    ) -> AuthError {
        let failures = self.throttle.record_failure(email);
        record_auth_failure(reason.as_str());
        let failures = failures.to_string();
        security_log!(
            SecurityEvent::AuthFailure,
            "Login rejected",
            "reason" => reason.as_str(),
            "failures" => failures.as_str()
        );
        self.audit_login(principal_id, false, Some(reason.as_str()), ctx)
            .await;
        AuthError::InvalidCredentials
    }

    async fn audit_login(
        &self,
        principal_id: Option<Uuid>,
        success: bool,
        reason: Option<&str>,
        ctx: &RequestContext,
    ) {
        let mut builder = AuditEvent::builder()
            .severity(if success {
                AuditSeverity::Info
            } else {
                AuditSeverity::Warning
            })
            .category(AuditCategory::Authentication)
            .action("login")
            .message(if success { "Login succeeded" } else { "Login failed" })
            .resource("session", None)
            .client(&ctx.client)
            .correlation_id(ctx.request_id.clone())
            .success(success);
        if let Some(id) = principal_id {
            builder = builder.actor(id.to_string());
        }
        if let Some(reason) = reason {
            builder = builder.metadata("reason", reason);
        }
        self.audit.record_built(builder).await;
    }

    /// Validate an access token and record session activity.
    pub async fn authenticate(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.verify_token(token).await?;
        if let Err(e) = with_timeout(
            self.retry.timeout,
            self.sessions.touch_session(claims.sid, Utc::now()),
        )
        .await
        {
            tracing::warn!(session_id = %claims.sid, error = %e, "Failed to touch session");
        }
        Ok(claims)
    }

    /// Validate an access token without side effects.
    pub async fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        match self.tokens.validate(token, TokenType::Access).await {
            Ok(claims) => Ok(claims),
            Err(e) => {
                record_auth_failure(e.reason());
                security_log!(SecurityEvent::TokenRejected, "Token rejected", "reason" => e.reason());
                Err(e.into())
            }
        }
    }

    /// New access token for a refresh token whose principal is still active.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self
            .tokens
            .validate(refresh_token, TokenType::Refresh)
            .await?;

        let principal = with_retry(&self.retry, "get_by_id", || {
            self.identities.get_by_id(claims.sub)
        })
        .await?
        .ok_or(AuthError::Token(TokenError::SessionInactive))?;
        if !principal.is_active {
            return Err(AuthError::AccountInactive);
        }

        Ok(self.tokens.refresh(refresh_token, &principal).await?)
    }

    /// Deactivate the token's session (or all of the principal's sessions)
    /// and blacklist the token. Returns the number of sessions revoked.
    pub async fn logout(
        &self,
        token: &str,
        all_sessions: bool,
        ctx: &RequestContext,
    ) -> Result<usize, AuthError> {
        let claims = self.verify_token(token).await?;

        let targets: Vec<Uuid> = if all_sessions {
            with_retry(&self.retry, "list_sessions_for_principal", || {
                self.sessions.list_sessions_for_principal(claims.sub)
            })
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .map(|s| s.id)
            .collect()
        } else {
            vec![claims.sid]
        };

        for session_id in &targets {
            with_timeout(self.retry.timeout, self.sessions.deactivate_session(*session_id))
                .await?;
        }
        self.tokens.blacklist(token).await?;

        let principal_id = claims.sub.to_string();
        let revoked = targets.len().to_string();
        security_log!(
            SecurityEvent::SessionRevoked,
            "Logout",
            "principal_id" => principal_id.as_str(),
            "sessions" => revoked.as_str()
        );
        self.audit
            .record_built(
                AuditEvent::builder()
                    .severity(AuditSeverity::Info)
                    .category(AuditCategory::Authentication)
                    .action("logout")
                    .message("Sessions revoked")
                    .actor(principal_id.clone())
                    .resource("session", Some(claims.sid.to_string()))
                    .metadata("all_sessions", all_sessions.to_string())
                    .metadata("revoked", revoked)
                    .client(&ctx.client)
                    .correlation_id(ctx.request_id.clone())
                    .success(true),
            )
            .await;

        Ok(targets.len())
    }

    /// Drop expired throttle records, blacklist entries and sessions.
    ///
    /// Store failures are logged and counted as zero; the next sweep retries.
    pub async fn sweep_expired(&self) -> SweepReport {
        let throttle_records = self.throttle.sweep_expired();
        let blacklist_entries = self.tokens.purge_expired().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Blacklist sweep failed");
            0
        });
        let sessions = match with_timeout(self.retry.timeout, self.sessions.purge_expired()).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Session sweep failed");
                0
            }
        };
        SweepReport {
            throttle_records,
            blacklist_entries,
            sessions,
        }
    }

    /// Static role check. Denials are audited before returning.
    pub async fn authorize(
        &self,
        claims: &Claims,
        permission: Permission,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        if self.permissions.has_permission(claims.role, permission) {
            return Ok(());
        }
        self.audit_denial(claims, permission.as_str(), ctx).await;
        Err(AuthError::Forbidden(permission.as_str().to_string()))
    }

    pub async fn require_superuser(
        &self,
        claims: &Claims,
        ctx: &RequestContext,
    ) -> Result<(), AuthError> {
        let principal = with_retry(&self.retry, "get_by_id", || {
            self.identities.get_by_id(claims.sub)
        })
        .await?;
        if principal.map(|p| p.is_superuser && p.is_active).unwrap_or(false) {
            return Ok(());
        }
        self.audit_denial(claims, "superuser", ctx).await;
        Err(AuthError::SuperuserRequired)
    }

    async fn audit_denial(&self, claims: &Claims, attempted: &str, ctx: &RequestContext) {
        let principal_id = claims.sub.to_string();
        security_log!(
            SecurityEvent::PermissionDenied,
            "Authorization denied",
            "principal_id" => principal_id.as_str(),
            "role" => claims.role.as_str(),
            "permission" => attempted
        );
        self.audit
            .record_built(
                AuditEvent::builder()
                    .severity(AuditSeverity::Warning)
                    .category(AuditCategory::Authorization)
                    .action("authorize")
                    .message(format!("Denied {} for role {}", attempted, claims.role))
                    .actor(principal_id)
                    .resource("permission", Some(attempted.to_string()))
                    .metadata("role", claims.role.as_str())
                    .client(&ctx.client)
                    .correlation_id(ctx.request_id.clone())
                    .success(false),
            )
            .await;
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid || email.len() > 254 {
        return Err(AuthError::Validation("invalid email address".into()));
    }
    Ok(email)
}
