//! Sentinel CORE
//!
//! Content-safety analysis and the authentication core that gates it.
//!
//! - **Analysis**: crisis safety, emotion and PHI detection over free text,
//!   run together by [`analysis::SafetyOrchestrator`]. Anything that cannot
//!   be fully analyzed is reported as undetermined, never as safe.
//! - **Auth**: Argon2id password hashing, HS256 tokens bound to server-side
//!   sessions, and a static role-to-permission table.
//! - **API**: a transport-agnostic JSON message protocol and handler.
//!
//! Persistence, audit storage and notification delivery sit behind traits
//! supplied by the embedding service.

pub mod analysis;
pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod security;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use analysis::{AnalysisError, PatternCatalog, SafetyOrchestrator};
use api::{ApiHandler, HandlerConfig};
use auth::{
    AuthService, IdentityStore, LoginThrottle, MemoryIdentityStore, MemorySessionStore,
    MemoryTokenBlacklist, PasswordError, PasswordHasher, PermissionEngine, RetryPolicy,
    SessionStore, SigningKey, TokenBlacklist, TokenConfig, TokenError, TokenService,
};
use config::{ConfigError, EnvConfig, PhiKeySource};
use security::{AuditLogger, AuditSink, EncryptionError, MemoryAuditSink, PhiCipher, PhiKey};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error("Invalid PHI key: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Invalid signing key: {0}")]
    Token(#[from] TokenError),
}

/// Collaborator stores supplied by the embedding service.
#[derive(Clone)]
pub struct RuntimeStores {
    pub identities: Arc<dyn IdentityStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub blacklist: Arc<dyn TokenBlacklist>,
    pub audit_sink: Arc<dyn AuditSink>,
}

impl RuntimeStores {
    pub fn in_memory() -> Self {
        Self {
            identities: Arc::new(MemoryIdentityStore::new()),
            sessions: Arc::new(MemorySessionStore::new()),
            blacklist: Arc::new(MemoryTokenBlacklist::new()),
            audit_sink: Arc::new(MemoryAuditSink::default()),
        }
    }
}

/// The assembled runtime.
pub struct SentinelRuntime {
    pub config: EnvConfig,
    pub catalog: Arc<PatternCatalog>,
    pub orchestrator: Arc<SafetyOrchestrator>,
    pub auth: Arc<AuthService>,
    pub audit: AuditLogger,
    pub handler: ApiHandler,
}

impl SentinelRuntime {
    /// Runtime over in-process stores.
    pub fn in_memory(config: EnvConfig) -> Result<Self, RuntimeError> {
        Self::with_stores(config, RuntimeStores::in_memory())
    }

    pub fn with_stores(config: EnvConfig, stores: RuntimeStores) -> Result<Self, RuntimeError> {
        let catalog = PatternCatalog::shared()?;
        let cipher = build_cipher(&config)?;
        let orchestrator = Arc::new(
            SafetyOrchestrator::new(catalog.clone(), cipher)
                .with_deadline(config.analysis.deadline),
        );

        let retry = RetryPolicy {
            timeout: config.store_timeout,
            ..RetryPolicy::default()
        };
        let audit = AuditLogger::new(stores.audit_sink.clone(), config.store_timeout);

        let mut token_config = TokenConfig::new(build_signing_key(&config)?);
        token_config.issuer = config.auth.issuer.clone();
        token_config.access_ttl = config.auth.access_ttl;
        token_config.refresh_ttl = config.auth.refresh_ttl;
        token_config.leeway = config.auth.leeway;
        let tokens = TokenService::new(
            token_config,
            stores.blacklist.clone(),
            stores.sessions.clone(),
            retry,
        );

        let auth = Arc::new(AuthService::new(
            PasswordHasher::new(config.auth.hashing)?,
            tokens,
            PermissionEngine::standard(),
            stores.identities.clone(),
            stores.sessions.clone(),
            audit.clone(),
            LoginThrottle::new(config.auth.max_failed_logins, config.auth.lockout_window),
            retry,
        )?);

        let handler = ApiHandler::new(
            orchestrator.clone(),
            auth.clone(),
            audit.clone(),
            HandlerConfig {
                max_content_length: config.analysis.max_content_length,
                max_message_size: config.max_message_size,
            },
        );

        tracing::info!(
            phi_encryption = config.analysis.phi_key.is_some(),
            deadline_ms = config.analysis.deadline.as_millis() as u64,
            "Sentinel runtime assembled"
        );

        Ok(Self {
            config,
            catalog,
            orchestrator,
            auth,
            audit,
            handler,
        })
    }
}

impl SentinelRuntime {
    /// Spawn the expiry sweep for sessions, blacklist entries and login
    /// throttle records. Runs until the handle is aborted.
    pub fn spawn_maintenance(&self, every: Duration) -> JoinHandle<()> {
        let auth = self.auth.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = auth.sweep_expired().await;
                tracing::debug!(
                    throttle_records = report.throttle_records,
                    blacklist_entries = report.blacklist_entries,
                    sessions = report.sessions,
                    "Expiry sweep finished"
                );
            }
        })
    }
}

fn build_signing_key(config: &EnvConfig) -> Result<SigningKey, RuntimeError> {
    match &config.auth.jwt_secret {
        Some(secret) => {
            if secret.len() < auth::token::MIN_SECRET_BYTES {
                return Err(ConfigError::SecretTooShort {
                    name: "SENTINEL_JWT_SECRET",
                    min: auth::token::MIN_SECRET_BYTES,
                }
                .into());
            }
            Ok(SigningKey::new(secret.as_bytes().to_vec())?)
        }
        None => {
            tracing::warn!("No signing secret configured; tokens will not survive a restart");
            Ok(SigningKey::generate())
        }
    }
}

fn build_cipher(config: &EnvConfig) -> Result<Option<Arc<PhiCipher>>, RuntimeError> {
    let key = match &config.analysis.phi_key {
        None => return Ok(None),
        Some(PhiKeySource::Hex(hex_key)) => PhiKey::from_hex(hex_key)?,
        Some(PhiKeySource::Passphrase { passphrase, salt }) => {
            if salt.len() < 8 {
                return Err(ConfigError::SecretTooShort {
                    name: "SENTINEL_PHI_SALT",
                    min: 8,
                }
                .into());
            }
            PhiKey::derive_from_passphrase(passphrase, salt.as_bytes())?
        }
    };
    Ok(Some(Arc::new(PhiCipher::new(&key)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_config() -> EnvConfig {
        let mut config = EnvConfig::default();
        config.auth.hashing = auth::HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        config
    }

    #[test]
    fn test_short_secret_is_rejected() {
        let mut config = cheap_config();
        config.auth.jwt_secret = Some("too-short".into());
        assert!(matches!(
            SentinelRuntime::in_memory(config),
            Err(RuntimeError::Config(ConfigError::SecretTooShort { .. }))
        ));
    }

    #[test]
    fn test_bad_phi_key_is_rejected() {
        let mut config = cheap_config();
        config.analysis.phi_key = Some(PhiKeySource::Hex("not-hex".into()));
        assert!(matches!(
            SentinelRuntime::in_memory(config),
            Err(RuntimeError::Encryption(_))
        ));
    }

    #[tokio::test]
    async fn test_maintenance_sweeps_stores() {
        let mut config = cheap_config();
        config.auth.jwt_secret = Some("m".repeat(40));
        let sessions = Arc::new(MemorySessionStore::new());
        let blacklist = Arc::new(MemoryTokenBlacklist::new());
        let mut stores = RuntimeStores::in_memory();
        stores.sessions = sessions.clone();
        stores.blacklist = blacklist.clone();
        let runtime = SentinelRuntime::with_stores(config, stores).unwrap();

        let stale = auth::Session::new(
            uuid::Uuid::new_v4(),
            chrono::Duration::seconds(-1),
            auth::ClientMetadata::default(),
        );
        sessions.create_session(stale).await.unwrap();
        blacklist.insert("expired-jti", Duration::ZERO).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(blacklist.len(), 1);

        let handle = runtime.spawn_maintenance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(sessions.is_empty());
        assert!(blacklist.is_empty());
    }

    #[test]
    fn test_assembles_with_passphrase_key() {
        let mut config = cheap_config();
        config.auth.jwt_secret = Some("x".repeat(48));
        config.analysis.phi_key = Some(PhiKeySource::Passphrase {
            passphrase: "correct horse battery".into(),
            salt: "facility-0042".into(),
        });
        let runtime = SentinelRuntime::in_memory(config).unwrap();
        assert_eq!(runtime.orchestrator.deadline().as_millis(), 2000);
    }
}
