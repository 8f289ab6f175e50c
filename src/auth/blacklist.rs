//! Token blacklist collaborator, keyed by `jti` with a TTL.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::store::StoreError;

#[async_trait]
pub trait TokenBlacklist: Send + Sync {
    /// Set-with-TTL. The entry may be dropped once the TTL passes.
    async fn insert(&self, jti: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn contains(&self, jti: &str) -> Result<bool, StoreError>;

    /// Drop entries past their TTL. Stores with native expiry keep the default.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// In-process blacklist. Expired entries are dropped on lookup and by
/// `purge_expired`.
#[derive(Default)]
pub struct MemoryTokenBlacklist {
    entries: DashMap<String, Instant>,
}

impl MemoryTokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenBlacklist for MemoryTokenBlacklist {
    async fn insert(&self, jti: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries.insert(jti.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn contains(&self, jti: &str) -> Result<bool, StoreError> {
        let expired = match self.entries.get(jti) {
            Some(expires) if *expires > Instant::now() => return Ok(true),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(jti);
        }
        Ok(false)
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires| *expires > now);
        Ok(before - self.entries.len())
    }
}
