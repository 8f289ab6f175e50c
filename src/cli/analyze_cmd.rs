//! Offline analysis subcommands: analyze, phi, emotion, hash-password.
//!
//! Results are printed as pretty JSON on stdout. Input text is never logged.

use std::io::BufRead;

use serde::Serialize;

use crate::analysis::{AnalysisMode, SafetyVerdict};
use crate::auth::{validate_password_strength, PasswordHasher};
use crate::config::{self, EnvConfig};
use crate::SentinelRuntime;

pub const EXIT_SAFE: i32 = 0;
pub const EXIT_UNSAFE: i32 = 1;
pub const EXIT_ERROR: i32 = 2;
pub const EXIT_UNDETERMINED: i32 = 3;

fn runtime() -> Result<SentinelRuntime, i32> {
    let cfg = config::load().map_err(|e| {
        eprintln!("Error: {}", e);
        EXIT_ERROR
    })?;
    SentinelRuntime::in_memory(cfg).map_err(|e| {
        eprintln!("Error: {}", e);
        EXIT_ERROR
    })
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            EXIT_SAFE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_ERROR
        }
    }
}

/// Combined analysis. Exit code reflects the verdict.
pub async fn run_analyze(text: &str) -> i32 {
    let runtime = match runtime() {
        Ok(r) => r,
        Err(code) => return code,
    };
    let outcome = runtime
        .orchestrator
        .analyze_combined(text, AnalysisMode::Detect)
        .await;
    let verdict = SafetyVerdict::certify(&outcome);

    match outcome {
        Ok(analysis) => {
            if print_json(&analysis) != EXIT_SAFE {
                return EXIT_ERROR;
            }
            match verdict {
                SafetyVerdict::Safe => EXIT_SAFE,
                _ => EXIT_UNSAFE,
            }
        }
        Err(e) => {
            eprintln!("Undetermined: {}", e);
            EXIT_UNDETERMINED
        }
    }
}

pub async fn run_phi(mode: &str, text: &str) -> i32 {
    let mode = match mode.parse::<AnalysisMode>() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };
    let runtime = match runtime() {
        Ok(r) => r,
        Err(code) => return code,
    };
    match runtime.orchestrator.detect_phi(text, mode).await {
        Ok(result) => print_json(&result),
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_client_error() {
                EXIT_ERROR
            } else {
                EXIT_UNDETERMINED
            }
        }
    }
}

pub async fn run_emotion(text: &str) -> i32 {
    let runtime = match runtime() {
        Ok(r) => r,
        Err(code) => return code,
    };
    match runtime.orchestrator.analyze_emotion(text).await {
        Ok(result) => print_json(&result),
        Err(e) => {
            eprintln!("Undetermined: {}", e);
            EXIT_UNDETERMINED
        }
    }
}

/// Read one password line from stdin and print its PHC hash.
pub async fn run_hash_password() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };

    let mut line = String::new();
    if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
        eprintln!("Error reading stdin: {}", e);
        return EXIT_ERROR;
    }
    let password = line.trim_end_matches(['\r', '\n']).to_string();

    match hash_password(&cfg, password).await {
        Ok(hash) => {
            println!("{}", hash);
            EXIT_SAFE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_ERROR
        }
    }
}

async fn hash_password(cfg: &EnvConfig, password: String) -> Result<String, crate::auth::PasswordError> {
    validate_password_strength(&password)?;
    let hasher = PasswordHasher::new(cfg.auth.hashing)?;
    hasher.hash_blocking(password).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::HashingConfig;

    #[tokio::test]
    async fn test_hash_password_rejects_weak() {
        let cfg = EnvConfig::default();
        assert!(hash_password(&cfg, "password".into()).await.is_err());
    }

    #[tokio::test]
    async fn test_hash_password_produces_phc() {
        let mut cfg = EnvConfig::default();
        cfg.auth.hashing = HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        };
        let hash = hash_password(&cfg, "Blue-Heron-Morning-42".into()).await.unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
    }
}
