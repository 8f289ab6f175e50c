//! Signed access/refresh tokens.
//!
//! Compact JWS with HMAC-SHA256. The verification algorithm is fixed by
//! configuration; a token's own `alg` header is only compared against it,
//! never used to pick a key.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use super::blacklist::TokenBlacklist;
use super::error::TokenError;
use super::identity::Principal;
use super::permissions::Role;
use super::session::SessionStore;
use super::store::{with_retry, with_timeout, RetryPolicy};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";
pub const MIN_SECRET_BYTES: usize = 32;
pub const DEFAULT_ISSUER: &str = "sentinel-core";
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(8 * 60 * 60);
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(30);
/// Upper bound for either token lifetime.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// HMAC signing secret. Debug output never shows key material.
#[derive(Clone)]
pub struct SigningKey(Vec<u8>);

impl SigningKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, TokenError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(TokenError::InvalidKey(format!(
                "signing key must be at least {} bytes, got {}",
                MIN_SECRET_BYTES,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; 64];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKey(***)")
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub signing_key: SigningKey,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Clock-skew allowance on `nbf`. Expiry is never extended.
    pub leeway: Duration,
}

impl TokenConfig {
    pub fn new(signing_key: SigningKey) -> Self {
        Self {
            signing_key,
            issuer: DEFAULT_ISSUER.to_string(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            leeway: DEFAULT_LEEWAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub sid: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub token_type: TokenType,
    pub jti: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

pub struct TokenService {
    config: TokenConfig,
    blacklist: Arc<dyn TokenBlacklist>,
    sessions: Arc<dyn SessionStore>,
    retry: RetryPolicy,
}

impl TokenService {
    pub fn new(
        config: TokenConfig,
        blacklist: Arc<dyn TokenBlacklist>,
        sessions: Arc<dyn SessionStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            config,
            blacklist,
            sessions,
            retry,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Access and refresh token bound to the same session.
    pub fn issue_pair(&self, principal: &Principal, session_id: Uuid) -> Result<TokenPair, TokenError> {
        self.issue_pair_at(principal, session_id, Utc::now())
    }

    pub fn issue_pair_at(
        &self,
        principal: &Principal,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.issue_at(principal, session_id, TokenType::Access, now)?,
            refresh_token: self.issue_at(principal, session_id, TokenType::Refresh, now)?,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_ttl.as_secs(),
        })
    }

    /// Issue one token with `iat = nbf = now`.
    pub fn issue_at(
        &self,
        principal: &Principal,
        session_id: Uuid,
        token_type: TokenType,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let ttl = match token_type {
            TokenType::Access => self.config.access_ttl,
            TokenType::Refresh => self.config.refresh_ttl,
        };
        if ttl > MAX_TOKEN_TTL {
            return Err(TokenError::LifetimeOutOfRange);
        }
        let iat = now.timestamp();
        let exp = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| iat.checked_add(secs))
            .ok_or(TokenError::LifetimeOutOfRange)?;
        let claims = Claims {
            sub: principal.id,
            email: principal.email.clone(),
            role: principal.role,
            sid: session_id,
            iat,
            nbf: iat,
            exp,
            iss: self.config.issuer.clone(),
            token_type,
            jti: Uuid::new_v4().to_string(),
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let header_json = serde_json::to_vec(&header).map_err(|_| TokenError::Malformed)?;
        let claims_json = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;

        let signing_input = format!("{}.{}", B64URL.encode(header_json), B64URL.encode(claims_json));
        let signature = self.mac(signing_input.as_bytes())?.finalize().into_bytes();

        Ok(format!("{}.{}", signing_input, B64URL.encode(signature)))
    }

    fn mac(&self, input: &[u8]) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.config.signing_key.0)
            .map_err(|e| TokenError::InvalidKey(e.to_string()))?;
        mac.update(input);
        Ok(mac)
    }

    /// Structure, algorithm and signature. No time or state checks.
    fn verify_signature(&self, token: &str) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, signature_b64) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(c), Some(s), None) => (h, c, s),
                _ => return Err(TokenError::Malformed),
            };

        let header_json = B64URL.decode(header_b64).map_err(|_| TokenError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header_json).map_err(|_| TokenError::Malformed)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::AlgorithmMismatch);
        }

        let signature = B64URL
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        self.mac(signing_input.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims_json = B64URL.decode(claims_b64).map_err(|_| TokenError::Malformed)?;
        serde_json::from_slice(&claims_json).map_err(|_| TokenError::Malformed)
    }

    /// Stateless checks in order: structure, algorithm, signature, nbf, exp,
    /// issuer, token type.
    pub fn decode_at(
        &self,
        token: &str,
        expected: TokenType,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let claims = self.verify_signature(token)?;
        let now = now.timestamp();
        let leeway = self.config.leeway.as_secs() as i64;

        if claims.nbf > now + leeway {
            return Err(TokenError::NotYetValid);
        }
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.iss != self.config.issuer {
            return Err(TokenError::InvalidIssuer);
        }
        if claims.token_type != expected {
            return Err(TokenError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Full validation: stateless checks, then blacklist, then session state.
    ///
    /// A store that cannot answer in time yields `StoreUnavailable`; the
    /// token is never treated as valid on an unconfirmed lookup.
    pub async fn validate(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let claims = self.decode_at(token, expected, Utc::now())?;

        let revoked = with_retry(&self.retry, "blacklist_contains", || {
            self.blacklist.contains(&claims.jti)
        })
        .await?;
        if revoked {
            return Err(TokenError::Revoked);
        }

        let session = with_retry(&self.retry, "get_session", || {
            self.sessions.get_session(claims.sid)
        })
        .await?;
        match session {
            Some(s) if s.principal_id == claims.sub && s.is_live(Utc::now()) => Ok(claims),
            _ => Err(TokenError::SessionInactive),
        }
    }

    /// Exchange a refresh token for a new access token on the same session.
    pub async fn refresh(&self, refresh_token: &str, principal: &Principal) -> Result<String, TokenError> {
        let claims = self.validate(refresh_token, TokenType::Refresh).await?;
        if claims.sub != principal.id {
            return Err(TokenError::SubjectMismatch);
        }
        self.issue_at(principal, claims.sid, TokenType::Access, Utc::now())
    }

    /// `(jti, remaining lifetime)` for a correctly signed token, or `None`
    /// when it has already expired and needs no entry.
    pub fn blacklist_entry(&self, token: &str) -> Result<Option<(String, Duration)>, TokenError> {
        self.blacklist_entry_at(token, Utc::now())
    }

    pub fn blacklist_entry_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(String, Duration)>, TokenError> {
        let claims = self.verify_signature(token)?;
        let remaining = claims.exp - now.timestamp();
        if remaining <= 0 {
            return Ok(None);
        }
        Ok(Some((claims.jti, Duration::from_secs(remaining as u64))))
    }

    /// Drop blacklist entries whose token has expired anyway.
    pub async fn purge_expired(&self) -> Result<usize, TokenError> {
        Ok(with_timeout(self.retry.timeout, self.blacklist.purge_expired()).await?)
    }

    /// Write the blacklist entry. Not retried.
    pub async fn blacklist(&self, token: &str) -> Result<(), TokenError> {
        if let Some((jti, ttl)) = self.blacklist_entry(token)? {
            with_timeout(self.retry.timeout, self.blacklist.insert(&jti, ttl)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::blacklist::MemoryTokenBlacklist;
    use crate::auth::session::{ClientMetadata, MemorySessionStore, Session};

    fn principal() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            email: "nurse@example.org".into(),
            display_name: None,
            role: Role::CareStaff,
            is_active: true,
            is_superuser: false,
            created_at: Utc::now(),
            last_login: None,
            password_hash: String::new(),
        }
    }

    fn service() -> (TokenService, Arc<MemorySessionStore>) {
        let sessions = Arc::new(MemorySessionStore::new());
        let key = SigningKey::new(vec![7u8; 32]).unwrap();
        let service = TokenService::new(
            TokenConfig::new(key),
            Arc::new(MemoryTokenBlacklist::new()),
            sessions.clone(),
            RetryPolicy::default(),
        );
        (service, sessions)
    }

    async fn live_session(sessions: &MemorySessionStore, principal: &Principal) -> Uuid {
        let session = Session::new(principal.id, chrono::Duration::days(1), ClientMetadata::default());
        let id = session.id;
        sessions.create_session(session).await.unwrap();
        id
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(matches!(
            SigningKey::new(vec![1u8; 16]),
            Err(TokenError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_round_trip_claims() {
        let (service, sessions) = service();
        let p = principal();
        let sid = live_session(&sessions, &p).await;

        let pair = service.issue_pair(&p, sid).unwrap();
        let claims = service.validate(&pair.access_token, TokenType::Access).await.unwrap();

        assert_eq!(claims.sub, p.id);
        assert_eq!(claims.role, Role::CareStaff);
        assert_eq!(claims.sid, sid);
        assert_eq!(pair.expires_in, DEFAULT_ACCESS_TTL.as_secs());
    }

    #[tokio::test]
    async fn test_type_isolation() {
        let (service, sessions) = service();
        let p = principal();
        let sid = live_session(&sessions, &p).await;
        let pair = service.issue_pair(&p, sid).unwrap();

        assert_eq!(
            service.validate(&pair.refresh_token, TokenType::Access).await,
            Err(TokenError::WrongTokenType)
        );
        assert_eq!(
            service.validate(&pair.access_token, TokenType::Refresh).await,
            Err(TokenError::WrongTokenType)
        );
    }

    #[test]
    fn test_expired_token_rejected() {
        let (service, _) = service();
        let p = principal();
        let issued = Utc::now() - chrono::Duration::hours(9);
        let token = service
            .issue_at(&p, Uuid::new_v4(), TokenType::Access, issued)
            .unwrap();

        assert_eq!(
            service.decode_at(&token, TokenType::Access, Utc::now()),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_not_yet_valid() {
        let (service, _) = service();
        let p = principal();
        let future = Utc::now() + chrono::Duration::minutes(10);
        let token = service
            .issue_at(&p, Uuid::new_v4(), TokenType::Access, future)
            .unwrap();

        assert_eq!(
            service.decode_at(&token, TokenType::Access, Utc::now()),
            Err(TokenError::NotYetValid)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let (service, _) = service();
        let token = service
            .issue_at(&principal(), Uuid::new_v4(), TokenType::Access, Utc::now())
            .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let mut claims: serde_json::Value =
            serde_json::from_slice(&B64URL.decode(parts[1]).unwrap()).unwrap();
        claims["role"] = serde_json::json!("system_admin");
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            B64URL.encode(serde_json::to_vec(&claims).unwrap()),
            parts[2]
        );

        assert_eq!(
            service.decode_at(&forged, TokenType::Access, Utc::now()),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_alg_none_rejected() {
        let (service, _) = service();
        let token = service
            .issue_at(&principal(), Uuid::new_v4(), TokenType::Access, Utc::now())
            .unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let none_header = B64URL.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let forged = format!("{}.{}.", none_header, parts[1]);

        assert_eq!(
            service.decode_at(&forged, TokenType::Access, Utc::now()),
            Err(TokenError::AlgorithmMismatch)
        );
    }

    #[test]
    fn test_malformed_structure() {
        let (service, _) = service();
        for bad in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert_eq!(
                service.decode_at(bad, TokenType::Access, Utc::now()),
                Err(TokenError::Malformed),
                "input {:?}",
                bad
            );
        }
    }

    #[tokio::test]
    async fn test_blacklist_revokes() {
        let (service, sessions) = service();
        let p = principal();
        let sid = live_session(&sessions, &p).await;
        let pair = service.issue_pair(&p, sid).unwrap();

        let (jti, ttl) = service.blacklist_entry(&pair.access_token).unwrap().unwrap();
        assert!(!jti.is_empty());
        assert!(ttl <= DEFAULT_ACCESS_TTL);

        service.blacklist(&pair.access_token).await.unwrap();
        assert_eq!(
            service.validate(&pair.access_token, TokenType::Access).await,
            Err(TokenError::Revoked)
        );
    }

    #[tokio::test]
    async fn test_inactive_session_rejected() {
        let (service, sessions) = service();
        let p = principal();
        let sid = live_session(&sessions, &p).await;
        let pair = service.issue_pair(&p, sid).unwrap();

        sessions.deactivate_session(sid).await.unwrap();
        assert_eq!(
            service.validate(&pair.access_token, TokenType::Access).await,
            Err(TokenError::SessionInactive)
        );
        assert_eq!(
            service.validate(&pair.refresh_token, TokenType::Refresh).await,
            Err(TokenError::SessionInactive)
        );
    }

    #[tokio::test]
    async fn test_refresh_issues_access_on_same_session() {
        let (service, sessions) = service();
        let p = principal();
        let sid = live_session(&sessions, &p).await;
        let pair = service.issue_pair(&p, sid).unwrap();

        let access = service.refresh(&pair.refresh_token, &p).await.unwrap();
        let claims = service.validate(&access, TokenType::Access).await.unwrap();
        assert_eq!(claims.sid, sid);

        let other = principal();
        assert_eq!(
            service.refresh(&pair.refresh_token, &other).await,
            Err(TokenError::SubjectMismatch)
        );
    }

    #[test]
    fn test_expired_token_needs_no_blacklist_entry() {
        let (service, _) = service();
        let issued = Utc::now() - chrono::Duration::days(2);
        let token = service
            .issue_at(&principal(), Uuid::new_v4(), TokenType::Access, issued)
            .unwrap();
        assert_eq!(service.blacklist_entry(&token).unwrap(), None);
    }

    #[test]
    fn test_oversized_ttl_is_refused() {
        let sessions = Arc::new(MemorySessionStore::new());
        let mut config = TokenConfig::new(SigningKey::new(vec![7u8; 32]).unwrap());
        config.access_ttl = Duration::from_secs(u64::MAX);
        let service = TokenService::new(
            config,
            Arc::new(MemoryTokenBlacklist::new()),
            sessions,
            RetryPolicy::default(),
        );

        assert_eq!(
            service.issue_at(&principal(), Uuid::new_v4(), TokenType::Access, Utc::now()),
            Err(TokenError::LifetimeOutOfRange)
        );
        let refresh = service
            .issue_at(&principal(), Uuid::new_v4(), TokenType::Refresh, Utc::now())
            .unwrap();
        assert!(service.decode_at(&refresh, TokenType::Refresh, Utc::now()).is_ok());
    }

    #[test]
    fn test_debug_hides_key() {
        let key = SigningKey::new(vec![9u8; 32]).unwrap();
        assert_eq!(format!("{:?}", key), "SigningKey(***)");
    }
}
