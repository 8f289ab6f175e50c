//! Runtime configuration.
//!
//! Values come from `SENTINEL_*` environment variables, layered over an
//! optional TOML file named by `SENTINEL_CONFIG_FILE`, layered over
//! defaults. Invalid or out-of-range values fall back to defaults or are
//! clamped; only an unreadable config file is an error here. Secret length
//! is checked when the runtime is built.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SENTINEL_CONFIG_FILE` | unset | TOML file with the same keys in lowercase |
//! | `SENTINEL_JWT_SECRET` | unset | HS256 signing secret (>= 32 bytes) |
//! | `SENTINEL_JWT_ISSUER` | sentinel-core | `iss` claim |
//! | `SENTINEL_ACCESS_TTL_SECS` | 28800 | Access token lifetime, at most 30 days |
//! | `SENTINEL_REFRESH_TTL_SECS` | 604800 | Refresh token and session lifetime, at most 30 days |
//! | `SENTINEL_TOKEN_LEEWAY_SECS` | 30 | Clock skew allowed on `nbf` |
//! | `SENTINEL_ARGON2_MEMORY_KIB` | 65536 | Argon2id memory cost |
//! | `SENTINEL_ARGON2_ITERATIONS` | 3 | Argon2id time cost |
//! | `SENTINEL_ARGON2_PARALLELISM` | 2 | Argon2id lanes |
//! | `SENTINEL_PHI_KEY` | unset | 64 hex chars, AES-256 key for encrypt mode |
//! | `SENTINEL_PHI_PASSPHRASE` | unset | Alternative to the raw key |
//! | `SENTINEL_PHI_SALT` | unset | Salt for the passphrase |
//! | `SENTINEL_ANALYSIS_DEADLINE_MS` | 2000 | Deadline for one analysis call |
//! | `SENTINEL_STORE_TIMEOUT_MS` | 2000 | Per-call store timeout |
//! | `SENTINEL_SWEEP_INTERVAL_SECS` | 60 | Expiry sweep period for sessions, blacklist and throttle |
//! | `SENTINEL_MAX_FAILED_LOGINS` | 5 | Failures before lockout |
//! | `SENTINEL_LOCKOUT_WINDOW_SECS` | 900 | Lockout window |
//! | `SENTINEL_MAX_CONTENT_LENGTH` | 50000 | Max analyzed content (chars) |
//! | `SENTINEL_MAX_MESSAGE_SIZE` | 1048576 | Max encoded API message (bytes) |
//! | `SENTINEL_LOG_LEVEL` | info | Tracing filter directive |
//! | `SENTINEL_LOG_FORMAT` | json | `json` or `pretty` |
//! | `SENTINEL_LOG_FILE` | unset | Log file instead of stderr |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::password::{
    HashingConfig, DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB, DEFAULT_PARALLELISM,
};
use crate::auth::token::{
    DEFAULT_ACCESS_TTL, DEFAULT_ISSUER, DEFAULT_LEEWAY, DEFAULT_REFRESH_TTL, MAX_TOKEN_TTL,
};
use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_ANALYSIS_DEADLINE_MS: u64 = 2000;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_FAILED_LOGINS: u32 = 5;
pub const DEFAULT_LOCKOUT_WINDOW_SECS: u64 = 900;
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 50_000;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("{name} must be at least {min} bytes")]
    SecretTooShort { name: &'static str, min: usize },

    #[error("Invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Keys accepted in the TOML file. All optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub jwt_secret: Option<String>,
    pub jwt_issuer: Option<String>,
    pub access_ttl_secs: Option<u64>,
    pub refresh_ttl_secs: Option<u64>,
    pub token_leeway_secs: Option<u64>,
    pub argon2_memory_kib: Option<u32>,
    pub argon2_iterations: Option<u32>,
    pub argon2_parallelism: Option<u32>,
    pub phi_key: Option<String>,
    pub phi_passphrase: Option<String>,
    pub phi_salt: Option<String>,
    pub analysis_deadline_ms: Option<u64>,
    pub store_timeout_ms: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub max_failed_logins: Option<u32>,
    pub lockout_window_secs: Option<u64>,
    pub max_content_length: Option<usize>,
    pub max_message_size: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: Option<String>,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub leeway: Duration,
    pub hashing: HashingConfig,
    pub max_failed_logins: u32,
    pub lockout_window: Duration,
}

/// Source for the PHI encryption key.
#[derive(Clone, PartialEq, Eq)]
pub enum PhiKeySource {
    Hex(String),
    Passphrase { passphrase: String, salt: String },
}

impl std::fmt::Debug for PhiKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hex(_) => f.write_str("PhiKeySource::Hex(***)"),
            Self::Passphrase { .. } => f.write_str("PhiKeySource::Passphrase(***)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub deadline: Duration,
    pub max_content_length: usize,
    pub phi_key: Option<PhiKeySource>,
}

/// All runtime configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_file: Option<PathBuf>,
    pub auth: AuthSettings,
    pub analysis: AnalysisSettings,
    pub store_timeout: Duration,
    pub sweep_interval: Duration,
    pub max_message_size: usize,
    pub logging: LogConfig,
}

/// Effective configuration with secrets reduced to presence flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub config_file: Option<String>,
    pub jwt_secret_set: bool,
    pub jwt_issuer: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub token_leeway_secs: u64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    pub phi_key_source: &'static str,
    pub analysis_deadline_ms: u64,
    pub store_timeout_ms: u64,
    pub sweep_interval_secs: u64,
    pub max_failed_logins: u32,
    pub lockout_window_secs: u64,
    pub max_content_length: usize,
    pub max_message_size: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_file: Option<String>,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Env value if it parses, else the file value, else `default`.
fn layered<T: FromStr>(key: &str, file: Option<T>, default: T) -> T {
    match std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok()) {
        Some(value) => value,
        None => file.unwrap_or(default),
    }
}

fn layered_string(key: &str, file: Option<String>) -> Option<String> {
    env_string(key).or(file.filter(|v| !v.trim().is_empty()))
}

fn load_auth(file: &FileConfig) -> AuthSettings {
    let access_secs = layered(
        "SENTINEL_ACCESS_TTL_SECS",
        file.access_ttl_secs,
        DEFAULT_ACCESS_TTL.as_secs(),
    )
    .clamp(60, MAX_TOKEN_TTL.as_secs());
    let refresh_secs = layered(
        "SENTINEL_REFRESH_TTL_SECS",
        file.refresh_ttl_secs,
        DEFAULT_REFRESH_TTL.as_secs(),
    )
    .clamp(access_secs, MAX_TOKEN_TTL.as_secs());
    let leeway_secs = layered(
        "SENTINEL_TOKEN_LEEWAY_SECS",
        file.token_leeway_secs,
        DEFAULT_LEEWAY.as_secs(),
    )
    .min(300);

    let parallelism = layered(
        "SENTINEL_ARGON2_PARALLELISM",
        file.argon2_parallelism,
        DEFAULT_PARALLELISM,
    )
    .clamp(1, 16);
    let memory_kib = layered(
        "SENTINEL_ARGON2_MEMORY_KIB",
        file.argon2_memory_kib,
        DEFAULT_MEMORY_KIB,
    )
    .max(1024)
    .max(8 * parallelism);
    let iterations = layered(
        "SENTINEL_ARGON2_ITERATIONS",
        file.argon2_iterations,
        DEFAULT_ITERATIONS,
    )
    .max(1);

    AuthSettings {
        jwt_secret: layered_string("SENTINEL_JWT_SECRET", file.jwt_secret.clone()),
        issuer: layered_string("SENTINEL_JWT_ISSUER", file.jwt_issuer.clone())
            .unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
        access_ttl: Duration::from_secs(access_secs),
        refresh_ttl: Duration::from_secs(refresh_secs),
        leeway: Duration::from_secs(leeway_secs),
        hashing: HashingConfig {
            memory_kib,
            iterations,
            parallelism,
        },
        max_failed_logins: layered(
            "SENTINEL_MAX_FAILED_LOGINS",
            file.max_failed_logins,
            DEFAULT_MAX_FAILED_LOGINS,
        )
        .max(1),
        lockout_window: Duration::from_secs(
            layered(
                "SENTINEL_LOCKOUT_WINDOW_SECS",
                file.lockout_window_secs,
                DEFAULT_LOCKOUT_WINDOW_SECS,
            )
            .max(1),
        ),
    }
}

fn load_analysis(file: &FileConfig) -> AnalysisSettings {
    let deadline_ms = layered(
        "SENTINEL_ANALYSIS_DEADLINE_MS",
        file.analysis_deadline_ms,
        DEFAULT_ANALYSIS_DEADLINE_MS,
    )
    .clamp(10, 60_000);
    let max_content_length = layered(
        "SENTINEL_MAX_CONTENT_LENGTH",
        file.max_content_length,
        DEFAULT_MAX_CONTENT_LENGTH,
    )
    .clamp(1, 1_000_000);

    let phi_key = match layered_string("SENTINEL_PHI_KEY", file.phi_key.clone()) {
        Some(hex) => Some(PhiKeySource::Hex(hex)),
        None => layered_string("SENTINEL_PHI_PASSPHRASE", file.phi_passphrase.clone()).map(
            |passphrase| PhiKeySource::Passphrase {
                passphrase,
                salt: layered_string("SENTINEL_PHI_SALT", file.phi_salt.clone())
                    .unwrap_or_default(),
            },
        ),
    };

    AnalysisSettings {
        deadline: Duration::from_millis(deadline_ms),
        max_content_length,
        phi_key,
    }
}

fn load_logging(file: &FileConfig) -> LogConfig {
    let format = layered_string("SENTINEL_LOG_FORMAT", file.log_format.clone())
        .and_then(|f| f.parse::<LogFormat>().ok())
        .unwrap_or_default();
    LogConfig {
        format,
        level: layered_string("SENTINEL_LOG_LEVEL", file.log_level.clone())
            .unwrap_or_else(|| "info".to_string()),
        output_path: env_string("SENTINEL_LOG_FILE")
            .map(PathBuf::from)
            .or_else(|| file.log_file.clone()),
    }
}

/// Build configuration from a file layer plus the environment.
pub fn load_with(file: &FileConfig, config_file: Option<PathBuf>) -> EnvConfig {
    let store_timeout_ms = layered(
        "SENTINEL_STORE_TIMEOUT_MS",
        file.store_timeout_ms,
        DEFAULT_STORE_TIMEOUT_MS,
    )
    .clamp(10, 60_000);
    let sweep_interval_secs = layered(
        "SENTINEL_SWEEP_INTERVAL_SECS",
        file.sweep_interval_secs,
        DEFAULT_SWEEP_INTERVAL_SECS,
    )
    .clamp(1, 3600);
    let max_message_size = layered(
        "SENTINEL_MAX_MESSAGE_SIZE",
        file.max_message_size,
        DEFAULT_MAX_MESSAGE_SIZE,
    )
    .max(4096);

    EnvConfig {
        config_file,
        auth: load_auth(file),
        analysis: load_analysis(file),
        store_timeout: Duration::from_millis(store_timeout_ms),
        sweep_interval: Duration::from_secs(sweep_interval_secs),
        max_message_size,
        logging: load_logging(file),
    }
}

/// Load configuration. Fails only when `SENTINEL_CONFIG_FILE` names a file
/// that cannot be read or parsed.
pub fn load() -> Result<EnvConfig, ConfigError> {
    match env_string("SENTINEL_CONFIG_FILE").map(PathBuf::from) {
        Some(path) => {
            let file = FileConfig::from_path(&path)?;
            Ok(load_with(&file, Some(path)))
        }
        None => Ok(load_with(&FileConfig::default(), None)),
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            auth: AuthSettings {
                jwt_secret: None,
                issuer: DEFAULT_ISSUER.to_string(),
                access_ttl: DEFAULT_ACCESS_TTL,
                refresh_ttl: DEFAULT_REFRESH_TTL,
                leeway: DEFAULT_LEEWAY,
                hashing: HashingConfig::default(),
                max_failed_logins: DEFAULT_MAX_FAILED_LOGINS,
                lockout_window: Duration::from_secs(DEFAULT_LOCKOUT_WINDOW_SECS),
            },
            analysis: AnalysisSettings {
                deadline: Duration::from_millis(DEFAULT_ANALYSIS_DEADLINE_MS),
                max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
                phi_key: None,
            },
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            logging: LogConfig::default(),
        }
    }
}

impl EnvConfig {
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            config_file: self.config_file.as_ref().map(|p| p.display().to_string()),
            jwt_secret_set: self.auth.jwt_secret.is_some(),
            jwt_issuer: self.auth.issuer.clone(),
            access_ttl_secs: self.auth.access_ttl.as_secs(),
            refresh_ttl_secs: self.auth.refresh_ttl.as_secs(),
            token_leeway_secs: self.auth.leeway.as_secs(),
            argon2_memory_kib: self.auth.hashing.memory_kib,
            argon2_iterations: self.auth.hashing.iterations,
            argon2_parallelism: self.auth.hashing.parallelism,
            phi_key_source: match &self.analysis.phi_key {
                Some(PhiKeySource::Hex(_)) => "hex",
                Some(PhiKeySource::Passphrase { .. }) => "passphrase",
                None => "none",
            },
            analysis_deadline_ms: self.analysis.deadline.as_millis() as u64,
            store_timeout_ms: self.store_timeout.as_millis() as u64,
            sweep_interval_secs: self.sweep_interval.as_secs(),
            max_failed_logins: self.auth.max_failed_logins,
            lockout_window_secs: self.auth.lockout_window.as_secs(),
            max_content_length: self.analysis.max_content_length,
            max_message_size: self.max_message_size,
            log_level: self.logging.level.clone(),
            log_format: self.logging.format,
            log_file: self
                .logging
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
        }
    }
}
