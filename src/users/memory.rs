//! In-process `UserStore` used by the test suite. A single mutex guards all
//! records, which gives `find_or_create` the same atomicity the unique
//! indexes give the PostgreSQL store.

use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{FederatedId, NewUser, User, UserStore};
use crate::{auth::federated::Provider, error::AppError};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<User>>, AppError> {
        self.users
            .lock()
            .map_err(|_| AppError::StoreUnavailable(anyhow::anyhow!("memory store poisoned")))
    }

    pub fn len(&self) -> usize {
        self.users.lock().map(|u| u.len()).unwrap_or_default()
    }

    /// Drops a record, standing in for out-of-band deletion.
    pub fn remove(&self, id: Uuid) {
        if let Ok(mut users) = self.users.lock() {
            users.retain(|u| u.id != id);
        }
    }
}

fn blank_user() -> User {
    User {
        id: Uuid::new_v4(),
        username: None,
        password_hash: None,
        google_id: None,
        facebook_id: None,
        secret: None,
        last_posted: None,
        created_at: OffsetDateTime::now_utc(),
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.lock()?;
        if users
            .iter()
            .any(|u| u.username.as_deref() == Some(new_user.username.as_str()))
        {
            return Err(AppError::DuplicateUsername);
        }
        let user = User {
            username: Some(new_user.username),
            password_hash: Some(new_user.password_hash),
            ..blank_user()
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()?
            .iter()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }

    async fn find_or_create(&self, identity: &FederatedId) -> Result<(User, bool), AppError> {
        let mut users = self.lock()?;
        if let Some(existing) = users
            .iter()
            .find(|u| u.external_id(identity.provider) == Some(identity.external_id.as_str()))
        {
            return Ok((existing.clone(), false));
        }
        let mut user = blank_user();
        match identity.provider {
            Provider::Google => user.google_id = Some(identity.external_id.clone()),
            Provider::Facebook => user.facebook_id = Some(identity.external_id.clone()),
        }
        users.push(user.clone());
        Ok((user, true))
    }

    async fn update_secret(&self, id: Uuid, secret: &str) -> Result<User, AppError> {
        let mut users = self.lock()?;
        let user = users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::NotFound)?;
        user.secret = Some(secret.to_string());
        user.last_posted = Some(OffsetDateTime::now_utc());
        Ok(user.clone())
    }

    async fn list_with_secret(&self) -> Result<Vec<User>, AppError> {
        let mut with_secret: Vec<User> = self
            .lock()?
            .iter()
            .filter(|u| u.secret.is_some())
            .cloned()
            .collect();
        with_secret.sort_by(|a, b| b.last_posted.cmp(&a.last_posted));
        Ok(with_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str) -> NewUser {
        NewUser {
            username: name.into(),
            password_hash: "$argon2id$placeholder".into(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_leaves_first_account_intact() {
        let store = MemoryUserStore::new();
        let first = store.create(local("alice")).await.expect("first insert");
        let err = store.create(local("alice")).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateUsername));
        assert_eq!(store.len(), 1);
        let found = store.find_by_username("alice").await.unwrap().expect("still there");
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn update_secret_is_idempotent() {
        let store = MemoryUserStore::new();
        let user = store.create(local("bob")).await.unwrap();
        store.update_secret(user.id, "I like jazz").await.unwrap();
        store.update_secret(user.id, "I like jazz").await.unwrap();

        let listed = store.list_with_secret().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].secret.as_deref(), Some("I like jazz"));
        assert!(listed[0].last_posted.is_some());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn listing_only_includes_users_with_a_secret() {
        let store = MemoryUserStore::new();
        let poster = store.create(local("poster")).await.unwrap();
        store.create(local("lurker")).await.unwrap();
        store.update_secret(poster.id, "secret text").await.unwrap();

        let listed = store.list_with_secret().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, poster.id);
    }

    #[tokio::test]
    async fn update_secret_on_missing_user_is_not_found() {
        let store = MemoryUserStore::new();
        let err = store.update_secret(Uuid::new_v4(), "x").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn provider_ids_are_scoped_per_provider() {
        let store = MemoryUserStore::new();
        let g = FederatedId { provider: Provider::Google, external_id: "42".into() };
        let f = FederatedId { provider: Provider::Facebook, external_id: "42".into() };
        let (gu, g_created) = store.find_or_create(&g).await.unwrap();
        let (fu, f_created) = store.find_or_create(&f).await.unwrap();
        assert!(g_created && f_created);
        assert_ne!(gu.id, fu.id);
        let (again, created) = store.find_or_create(&g).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, gu.id);
    }
}
