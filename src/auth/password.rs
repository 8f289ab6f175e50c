//! Argon2id password hashing.
//!
//! Hashes are PHC strings (`$argon2id$v=19$m=65536,t=3,p=2$<salt>$<hash>`),
//! so verification reads its cost parameters from the stored value and old
//! hashes keep verifying after the configured parameters change.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use super::error::PasswordError;

pub const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
pub const DEFAULT_ITERATIONS: u32 = 3;
pub const DEFAULT_PARALLELISM: u32 = 2;
pub const OUTPUT_LEN: usize = 32;

pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_PASSWORD_CHARS: usize = 128;

/// Lowercase. Matched case-insensitively against the whole password.
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password1!",
    "password123",
    "password123!",
    "passw0rd!",
    "p@ssw0rd",
    "p@ssw0rd1",
    "12345678",
    "123456789",
    "qwerty123",
    "qwerty123!",
    "letmein1!",
    "welcome1!",
    "welcome123!",
    "admin123!",
    "changeme1!",
    "iloveyou1!",
];

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: HashingConfig) -> Result<Self, PasswordError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            Some(OUTPUT_LEN),
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let normalized = normalize(password);
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(normalized.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify against a stored PHC string using the parameters it embeds.
    ///
    /// The derived key comparison is constant-time.
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        let parsed = parse_argon2id(encoded)?;
        let normalized = normalize(password);

        match Argon2::default().verify_password(normalized.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Hashing(e.to_string())),
        }
    }

    /// True if the stored hash uses different parameters than this hasher.
    pub fn needs_rehash(&self, encoded: &str) -> Result<bool, PasswordError> {
        let parsed = parse_argon2id(encoded)?;
        let stored = Params::try_from(&parsed)
            .map_err(|e| PasswordError::MalformedHash(e.to_string()))?;

        Ok(parsed.version != Some(Version::V0x13 as u32)
            || stored.m_cost() != self.params.m_cost()
            || stored.t_cost() != self.params.t_cost()
            || stored.p_cost() != self.params.p_cost())
    }

    /// `hash` on the blocking pool.
    pub async fn hash_blocking(&self, password: String) -> Result<String, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError::Hashing(format!("hashing task failed: {}", e)))?
    }

    /// `verify` on the blocking pool.
    pub async fn verify_blocking(
        &self,
        password: String,
        encoded: String,
    ) -> Result<bool, PasswordError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &encoded))
            .await
            .map_err(|e| PasswordError::Hashing(format!("verification task failed: {}", e)))?
    }
}

fn parse_argon2id(encoded: &str) -> Result<PasswordHash<'_>, PasswordError> {
    let parsed =
        PasswordHash::new(encoded).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    if parsed.algorithm != argon2::ARGON2ID_IDENT {
        return Err(PasswordError::MalformedHash(format!(
            "unsupported algorithm {}",
            parsed.algorithm
        )));
    }
    Ok(parsed)
}

fn normalize(password: &str) -> String {
    password.nfkc().collect()
}

/// Check length, character classes and the common-password denylist.
///
/// Every failed rule is reported, not just the first.
pub fn validate_password_strength(password: &str) -> Result<(), PasswordError> {
    let mut issues = Vec::new();
    let length = password.chars().count();

    if length < MIN_PASSWORD_CHARS {
        issues.push(format!("must be at least {} characters", MIN_PASSWORD_CHARS));
    }
    if length > MAX_PASSWORD_CHARS {
        issues.push(format!("must be at most {} characters", MAX_PASSWORD_CHARS));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        issues.push("must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        issues.push("must contain an uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        issues.push("must contain a digit".to_string());
    }
    if !password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
    {
        issues.push("must contain a symbol".to_string());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.iter().any(|p| *p == lowered) {
        issues.push("is a commonly used password".to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(PasswordError::TooWeak { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> PasswordHasher {
        PasswordHasher::new(HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let hasher = cheap_hasher();
        let hash = hasher.hash("Correct-Horse-9").unwrap();

        assert!(hash.starts_with("$argon2id$v=19$m=1024,t=1,p=1$"));
        assert!(hasher.verify("Correct-Horse-9", &hash).unwrap());
        assert!(!hasher.verify("Correct-Horse-8", &hash).unwrap());
    }

    #[test]
    fn test_salt_is_fresh() {
        let hasher = cheap_hasher();
        let a = hasher.hash("Same-Password-1").unwrap();
        let b = hasher.hash("Same-Password-1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_uses_embedded_params() {
        let old = cheap_hasher();
        let hash = old.hash("Rotate-Me-42!").unwrap();

        let new = PasswordHasher::new(HashingConfig {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        })
        .unwrap();

        assert!(new.verify("Rotate-Me-42!", &hash).unwrap());
        assert!(new.needs_rehash(&hash).unwrap());
        assert!(!old.needs_rehash(&hash).unwrap());
    }

    #[test]
    fn test_default_params_encoding() {
        let hasher = PasswordHasher::new(HashingConfig::default()).unwrap();
        let hash = hasher.hash("Default-Cost-7!").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=65536,t=3,p=2$"));
    }

    #[test]
    fn test_nfkc_normalization() {
        let hasher = cheap_hasher();
        // U+FF21 FULLWIDTH LATIN CAPITAL LETTER A normalizes to 'A'
        let hash = hasher.hash("\u{FF21}bcdef-12").unwrap();
        assert!(hasher.verify("Abcdef-12", &hash).unwrap());
    }

    #[test]
    fn test_malformed_hash() {
        let hasher = cheap_hasher();
        assert!(matches!(
            hasher.verify("anything", "not-a-phc-string"),
            Err(PasswordError::MalformedHash(_))
        ));
    }

    #[test]
    fn test_strength_rules() {
        assert!(validate_password_strength("Str0ng&Secure").is_ok());

        match validate_password_strength("short") {
            Err(PasswordError::TooWeak { issues }) => {
                assert!(issues.iter().any(|i| i.contains("at least 8")));
                assert!(issues.iter().any(|i| i.contains("uppercase")));
                assert!(issues.iter().any(|i| i.contains("digit")));
                assert!(issues.iter().any(|i| i.contains("symbol")));
            }
            other => panic!("expected TooWeak, got {:?}", other),
        }

        let long = format!("Aa1!{}", "x".repeat(200));
        assert!(validate_password_strength(&long).is_err());
    }

    #[test]
    fn test_denylist_is_case_insensitive() {
        match validate_password_strength("PassWord123!") {
            Err(PasswordError::TooWeak { issues }) => {
                assert_eq!(issues, vec!["is a commonly used password".to_string()]);
            }
            other => panic!("expected TooWeak, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let hasher = cheap_hasher();
        let hash = hasher.hash_blocking("Async-Pass-1".into()).await.unwrap();
        assert!(hasher
            .verify_blocking("Async-Pass-1".into(), hash)
            .await
            .unwrap());
    }
}
