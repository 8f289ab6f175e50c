//! Config CLI subcommands: show, defaults, validate.

use crate::config::{self, EffectiveConfig, EnvConfig};
use crate::SentinelRuntime;

/// OWASP floor for Argon2id memory cost.
const RECOMMENDED_MIN_MEMORY_KIB: u32 = 19 * 1024;

/// Print the effective config as key-value pairs. Secrets are never printed.
pub fn run_show() -> i32 {
    match config::load() {
        Ok(cfg) => {
            print_config(&cfg.effective_config());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}

/// Print default values (no env or file overrides).
pub fn run_defaults() {
    print_config(&EnvConfig::default().effective_config());
}

/// Load the config and assemble a runtime from it.
///
/// Returns 0 if valid, 1 if only warnings were found, 2 on errors.
pub fn run_validate() -> i32 {
    let cfg = match config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return 2;
        }
    };

    let warnings = collect_warnings(&cfg);
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }

    if let Err(e) = SentinelRuntime::in_memory(cfg) {
        eprintln!("ERROR: {}", e);
        return 2;
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

fn collect_warnings(cfg: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if cfg.auth.jwt_secret.is_none() {
        warnings.push("SENTINEL_JWT_SECRET is unset; a random key is used per process".to_string());
    }
    if cfg.auth.hashing.memory_kib < RECOMMENDED_MIN_MEMORY_KIB {
        warnings.push(format!(
            "SENTINEL_ARGON2_MEMORY_KIB ({}) is below the recommended {}",
            cfg.auth.hashing.memory_kib, RECOMMENDED_MIN_MEMORY_KIB
        ));
    }
    if cfg.analysis.phi_key.is_none() {
        warnings.push("No PHI key configured; encrypt mode will be refused".to_string());
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    println!("SENTINEL_CONFIG_FILE={}", opt(&cfg.config_file));
    println!("SENTINEL_JWT_SECRET={}", if cfg.jwt_secret_set { "<set>" } else { "" });
    println!("SENTINEL_JWT_ISSUER={}", cfg.jwt_issuer);
    println!("SENTINEL_ACCESS_TTL_SECS={}", cfg.access_ttl_secs);
    println!("SENTINEL_REFRESH_TTL_SECS={}", cfg.refresh_ttl_secs);
    println!("SENTINEL_TOKEN_LEEWAY_SECS={}", cfg.token_leeway_secs);
    println!("SENTINEL_ARGON2_MEMORY_KIB={}", cfg.argon2_memory_kib);
    println!("SENTINEL_ARGON2_ITERATIONS={}", cfg.argon2_iterations);
    println!("SENTINEL_ARGON2_PARALLELISM={}", cfg.argon2_parallelism);
    println!("SENTINEL_PHI_KEY_SOURCE={}", cfg.phi_key_source);
    println!("SENTINEL_ANALYSIS_DEADLINE_MS={}", cfg.analysis_deadline_ms);
    println!("SENTINEL_STORE_TIMEOUT_MS={}", cfg.store_timeout_ms);
    println!("SENTINEL_SWEEP_INTERVAL_SECS={}", cfg.sweep_interval_secs);
    println!("SENTINEL_MAX_FAILED_LOGINS={}", cfg.max_failed_logins);
    println!("SENTINEL_LOCKOUT_WINDOW_SECS={}", cfg.lockout_window_secs);
    println!("SENTINEL_MAX_CONTENT_LENGTH={}", cfg.max_content_length);
    println!("SENTINEL_MAX_MESSAGE_SIZE={}", cfg.max_message_size);
    println!("SENTINEL_LOG_LEVEL={}", cfg.log_level);
    println!(
        "SENTINEL_LOG_FORMAT={}",
        match cfg.log_format {
            crate::telemetry::LogFormat::Json => "json",
            crate::telemetry::LogFormat::Pretty => "pretty",
        }
    );
    println!("SENTINEL_LOG_FILE={}", opt(&cfg.log_file));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};
    use crate::config::PhiKeySource;

    #[test]
    fn test_defaults_warn_but_assemble() {
        let cfg = EnvConfig::default();
        let warnings = collect_warnings(&cfg);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("SENTINEL_JWT_SECRET")));
        assert!(warnings.iter().any(|w| w.contains("PHI key")));
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SENTINEL_JWT_SECRET", "short");
        assert_eq!(run_validate(), 2);
        clear_env_vars();
    }

    #[test]
    fn test_validate_clean_config() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("SENTINEL_JWT_SECRET", "k".repeat(40));
        std::env::set_var("SENTINEL_PHI_KEY", "ab".repeat(32));
        assert_eq!(run_validate(), 0);
        clear_env_vars();
    }

    #[test]
    fn test_weak_argon2_memory_warns() {
        let mut cfg = EnvConfig::default();
        cfg.auth.jwt_secret = Some("k".repeat(40));
        cfg.analysis.phi_key = Some(PhiKeySource::Hex("ab".repeat(32)));
        cfg.auth.hashing.memory_kib = 4096;
        let warnings = collect_warnings(&cfg);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ARGON2_MEMORY_KIB"));
    }

    #[test]
    fn test_print_config_smoke() {
        print_config(&EnvConfig::default().effective_config());
    }
}
