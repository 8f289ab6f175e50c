//! Server-side sessions and the session-store collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::StoreError;

/// Client details captured at login and carried into audit records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub client: ClientMetadata,
    pub is_active: bool,
}

impl Session {
    /// A TTL that overflows the calendar yields an already-expired session.
    pub fn new(principal_id: Uuid, ttl: ChronoDuration, client: ClientMetadata) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            principal_id,
            created_at: now,
            last_activity: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(now),
            client,
            is_active: true,
        }
    }

    /// Active and not past expiry.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<(), StoreError>;
    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;
    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
    /// Idempotent: deactivating an inactive session is not an error.
    async fn deactivate_session(&self, id: Uuid) -> Result<(), StoreError>;
    async fn list_sessions_for_principal(&self, principal_id: Uuid)
        -> Result<Vec<Session>, StoreError>;

    /// Drop expired and inactive sessions. Stores with native expiry keep
    /// the default.
    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<Uuid, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: Session) -> Result<(), StoreError> {
        self.sessions.insert(session.id, session);
        Ok(())
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn touch_session(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut session = self.sessions.get_mut(&id).ok_or(StoreError::NotFound)?;
        if at > session.last_activity {
            session.last_activity = at;
        }
        Ok(())
    }

    async fn deactivate_session(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(mut session) = self.sessions.get_mut(&id) {
            session.is_active = false;
        }
        Ok(())
    }

    async fn list_sessions_for_principal(
        &self,
        principal_id: Uuid,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(self
            .sessions
            .iter()
            .filter(|entry| entry.principal_id == principal_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.is_live(now));
        Ok(before - self.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = MemorySessionStore::new();
        let principal = Uuid::new_v4();
        let session = Session::new(principal, ChronoDuration::hours(1), ClientMetadata::default());
        let id = session.id;

        store.create_session(session).await.unwrap();
        assert!(store.get_session(id).await.unwrap().unwrap().is_live(Utc::now()));

        store.deactivate_session(id).await.unwrap();
        assert!(!store.get_session(id).await.unwrap().unwrap().is_live(Utc::now()));

        // Second deactivation is a no-op
        store.deactivate_session(id).await.unwrap();
    }

    #[tokio::test]
    async fn test_touch_moves_activity_forward_only() {
        let store = MemorySessionStore::new();
        let session = Session::new(Uuid::new_v4(), ChronoDuration::hours(1), ClientMetadata::default());
        let id = session.id;
        let created = session.last_activity;
        store.create_session(session).await.unwrap();

        store.touch_session(id, created - ChronoDuration::minutes(5)).await.unwrap();
        assert_eq!(store.get_session(id).await.unwrap().unwrap().last_activity, created);

        let later = created + ChronoDuration::minutes(5);
        store.touch_session(id, later).await.unwrap();
        assert_eq!(store.get_session(id).await.unwrap().unwrap().last_activity, later);
    }

    #[test]
    fn test_overflowing_ttl_is_not_live() {
        let session = Session::new(Uuid::new_v4(), ChronoDuration::days(100_000_000), ClientMetadata::default());
        assert!(!session.is_live(Utc::now()));
    }

    #[tokio::test]
    async fn test_list_and_purge() {
        let store = MemorySessionStore::new();
        let principal = Uuid::new_v4();
        for _ in 0..3 {
            store
                .create_session(Session::new(principal, ChronoDuration::hours(1), ClientMetadata::default()))
                .await
                .unwrap();
        }
        let expired = Session::new(principal, ChronoDuration::seconds(-1), ClientMetadata::default());
        store.create_session(expired).await.unwrap();

        assert_eq!(store.list_sessions_for_principal(principal).await.unwrap().len(), 4);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.list_sessions_for_principal(principal).await.unwrap().len(), 3);
    }
}
