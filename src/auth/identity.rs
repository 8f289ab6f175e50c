//! Principals and the identity-store collaborator.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::permissions::Role;
use super::store::StoreError;

/// A user identity as held by the identity store.
#[derive(Clone)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    /// PHC string. Never leaves the auth core.
    pub password_hash: String,
}

impl Principal {
    pub fn public_profile(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("is_active", &self.is_active)
            .field("is_superuser", &self.is_superuser)
            .field("password_hash", &"***")
            .finish()
    }
}

/// Outward projection of a principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fails with `StoreError::Conflict` when the email is taken.
    async fn create_principal(&self, principal: Principal) -> Result<Principal, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError>;
    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// In-process identity store. Emails are matched case-insensitively.
#[derive(Default)]
pub struct MemoryIdentityStore {
    principals: DashMap<Uuid, Principal>,
    by_email: DashMap<String, Uuid>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut principal = self.principals.get_mut(&id).ok_or(StoreError::NotFound)?;
        principal.is_active = active;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn create_principal(&self, principal: Principal) -> Result<Principal, StoreError> {
        let key = principal.email.to_lowercase();
        match self.by_email.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::Conflict("email already registered".into()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(principal.id);
                self.principals.insert(principal.id, principal.clone());
                Ok(principal)
            }
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        let id = match self.by_email.get(&email.to_lowercase()) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.principals.get(&id).map(|p| p.clone()))
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Principal>, StoreError> {
        Ok(self.principals.get(&id).map(|p| p.clone()))
    }

    async fn update_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut principal = self.principals.get_mut(&id).ok_or(StoreError::NotFound)?;
        principal.last_login = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(email: &str) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            email: email.to_string(),
            display_name: Some("Ada".into()),
            role: Role::Resident,
            is_active: true,
            is_superuser: false,
            created_at: Utc::now(),
            last_login: None,
            password_hash: "$argon2id$secret".into(),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let store = MemoryIdentityStore::new();
        let created = store.create_principal(principal("ada@example.org")).await.unwrap();

        let by_email = store.get_by_email("ADA@example.org").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert!(store.get_by_id(created.id).await.unwrap().is_some());
        assert!(store.get_by_email("bob@example.org").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryIdentityStore::new();
        store.create_principal(principal("ada@example.org")).await.unwrap();
        let result = store.create_principal(principal("Ada@Example.org")).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_last_login_update() {
        let store = MemoryIdentityStore::new();
        let created = store.create_principal(principal("ada@example.org")).await.unwrap();
        let at = Utc::now();
        store.update_last_login(created.id, at).await.unwrap();
        let fetched = store.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.last_login, Some(at));
    }

    #[test]
    fn test_debug_hides_hash() {
        let rendered = format!("{:?}", principal("ada@example.org"));
        assert!(!rendered.contains("secret"));
    }
}
