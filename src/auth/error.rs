//! Auth error types.

use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Password does not meet strength requirements: {}", issues.join("; "))]
    TooWeak { issues: Vec<String> },

    #[error("Invalid KDF parameters: {0}")]
    InvalidParams(String),

    #[error("Malformed password hash: {0}")]
    MalformedHash(String),

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token algorithm does not match the configured algorithm")]
    AlgorithmMismatch,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token not yet valid")]
    NotYetValid,

    #[error("Token expired")]
    Expired,

    #[error("Wrong token type")]
    WrongTokenType,

    #[error("Token revoked")]
    Revoked,

    #[error("Session is not active")]
    SessionInactive,

    #[error("Invalid token issuer")]
    InvalidIssuer,

    #[error("Token subject does not match principal")]
    SubjectMismatch,

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Cannot confirm token validity: {0}")]
    StoreUnavailable(String),

    #[error("Token lifetime out of range")]
    LifetimeOutOfRange,
}

impl TokenError {
    /// Short reason used in security logs and metrics labels.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::AlgorithmMismatch => "algorithm_mismatch",
            Self::InvalidSignature => "invalid_signature",
            Self::NotYetValid => "not_yet_valid",
            Self::Expired => "expired",
            Self::WrongTokenType => "wrong_token_type",
            Self::Revoked => "revoked",
            Self::SessionInactive => "session_inactive",
            Self::InvalidIssuer => "invalid_issuer",
            Self::SubjectMismatch => "subject_mismatch",
            Self::InvalidKey(_) => "invalid_key",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::LifetimeOutOfRange => "lifetime_out_of_range",
        }
    }
}

impl From<StoreError> for TokenError {
    fn from(e: StoreError) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    /// The only login failure a client ever sees.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Too many failed login attempts, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Email already registered")]
    EmailTaken,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Account inactive")]
    AccountInactive,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Superuser required")]
    SuperuserRequired,

    #[error("Dependency failure: {0}")]
    Store(#[from] StoreError),
}
