use std::sync::Arc;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use super::password::{burn_verification, hash_password, verify_password};
use crate::{
    error::AppError,
    users::{NewUser, User, UserStore},
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[a-z0-9._@+-]{3,64}$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Local username/password strategy.
#[derive(Clone)]
pub struct CredentialVerifier {
    users: Arc<dyn UserStore>,
}

impl CredentialVerifier {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = normalize_username(username);
        if !is_valid_username(&username) {
            warn!("invalid username");
            return Err(AppError::InvalidInput(
                "Usernames are 3-64 characters: letters, digits and . _ @ + -".into(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(AppError::InvalidInput(format!(
                "Passwords need at least {MIN_PASSWORD_LEN} characters."
            )));
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .context("password hashing task")??;

        let user = self
            .users
            .create(NewUser {
                username,
                password_hash,
            })
            .await?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Unknown user, OAuth-only account and wrong password all return
    /// `InvalidCredentials`; the cause only goes to the log.
    #[instrument(skip(self, password))]
    pub async fn verify(&self, username: &str, password: &str) -> Result<User, AppError> {
        let username = normalize_username(username);
        let password = password.to_string();

        // Never registrable, so skip the store; Postgres also rejects some of these bytes.
        if !is_valid_username(&username) {
            tokio::task::spawn_blocking(move || burn_verification(&password))
                .await
                .context("password verification task")?;
            warn!("login with malformed username");
            return Err(AppError::InvalidCredentials);
        }

        let found = self.users.find_by_username(&username).await?;

        let Some(user) = found else {
            tokio::task::spawn_blocking(move || burn_verification(&password))
                .await
                .context("password verification task")?;
            warn!("login for unknown username");
            return Err(AppError::InvalidCredentials);
        };

        let Some(stored) = user.password_hash.clone() else {
            tokio::task::spawn_blocking(move || burn_verification(&password))
                .await
                .context("password verification task")?;
            warn!(user_id = %user.id, "password login on federated-only account");
            return Err(AppError::InvalidCredentials);
        };

        let ok = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .context("password verification task")??;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::federated::Provider,
        users::{memory::MemoryUserStore, FederatedId},
    };

    fn verifier() -> (Arc<MemoryUserStore>, CredentialVerifier) {
        let store = Arc::new(MemoryUserStore::new());
        (store.clone(), CredentialVerifier::new(store))
    }

    #[test]
    fn username_rules() {
        assert!(is_valid_username("alice@example.com"));
        assert!(is_valid_username("bob.smith"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert_eq!(normalize_username("  Alice@Example.COM "), "alice@example.com");
    }

    #[tokio::test]
    async fn register_never_stores_plaintext() {
        let (_, v) = verifier();
        let user = v.register("alice", "hunter2hunter2").await.expect("register");
        let hash = user.password_hash.expect("local user has a hash");
        assert!(!hash.contains("hunter2hunter2"));
        assert!(verify_password("hunter2hunter2", &hash).unwrap());
    }

    #[tokio::test]
    async fn second_registration_is_duplicate() {
        let (store, v) = verifier();
        let first = v.register("alice", "password-one").await.expect("first");
        let err = v.register("Alice", "password-two").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateUsername));
        assert_eq!(store.len(), 1);
        let again = v.verify("alice", "password-one").await.expect("first still works");
        assert_eq!(again.id, first.id);
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_the_same() {
        let (_, v) = verifier();
        v.register("alice", "correct-password").await.unwrap();

        let wrong = v.verify("alice", "wrong").await.unwrap_err();
        let unknown = v.verify("nosuchuser", "x").await.unwrap_err();
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status(), unknown.status());
    }

    #[tokio::test]
    async fn provider_id_is_not_a_login_name() {
        let (store, v) = verifier();
        store
            .find_or_create(&FederatedId {
                provider: Provider::Google,
                external_id: "g-1".into(),
            })
            .await
            .unwrap();
        let err = v.verify("g-1", "anything").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn malformed_username_is_invalid_credentials() {
        let (_, v) = verifier();
        v.register("alice", "correct-password").await.unwrap();
        for name in ["al\0ice", "x", "has space"] {
            let err = v.verify(name, "correct-password").await.unwrap_err();
            assert!(matches!(err, AppError::InvalidCredentials), "{name:?}");
        }
    }

    #[tokio::test]
    async fn short_password_is_rejected_before_hashing() {
        let (store, v) = verifier();
        let err = v.register("carol", "short").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(store.len(), 0);
    }
}
