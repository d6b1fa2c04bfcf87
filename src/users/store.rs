use std::{future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::repo_types::{FederatedId, NewUser, UpsertedUser, User};
use crate::{auth::federated::Provider, error::AppError};

/// Persistence for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a local account. A taken username yields `DuplicateUsername`.
    async fn create(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Return the user holding `identity`, creating it if absent. Atomic per
    /// provider id; the flag is true when a record was created.
    async fn find_or_create(&self, identity: &FederatedId) -> Result<(User, bool), AppError>;

    /// Set the user's secret and stamp `last_posted`. `NotFound` if the id is gone.
    async fn update_secret(&self, id: Uuid, secret: &str) -> Result<User, AppError>;

    /// All users with a non-null secret, most recent post first.
    async fn list_with_secret(&self) -> Result<Vec<User>, AppError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
    timeout: Duration,
}

impl PgUserStore {
    pub fn new(db: PgPool, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res.map_err(|e| unavailable(op, e)),
            Err(_) => Err(timed_out(op, self.timeout)),
        }
    }
}

fn unavailable(op: &'static str, e: sqlx::Error) -> AppError {
    AppError::StoreUnavailable(anyhow::Error::new(e).context(op))
}

fn timed_out(op: &'static str, after: Duration) -> AppError {
    AppError::StoreUnavailable(anyhow::anyhow!("{op} timed out after {after:?}"))
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let query = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, password_hash, google_id, facebook_id,
                      secret, last_posted, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.password_hash);

        let res = tokio::time::timeout(self.timeout, query.fetch_one(&self.db))
            .await
            .map_err(|_| timed_out("create user", self.timeout))?;

        match res {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!("username unique violation");
                Err(AppError::DuplicateUsername)
            }
            Err(e) => Err(unavailable("create user", e)),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        self.bounded(
            "find user by id",
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, username, password_hash, google_id, facebook_id,
                       secret, last_posted, created_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.db),
        )
        .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        self.bounded(
            "find user by username",
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, username, password_hash, google_id, facebook_id,
                       secret, last_posted, created_at
                FROM users
                WHERE username = $1
                "#,
            )
            .bind(username)
            .fetch_optional(&self.db),
        )
        .await
    }

    #[instrument(skip(self), fields(provider = %identity.provider))]
    async fn find_or_create(&self, identity: &FederatedId) -> Result<(User, bool), AppError> {
        // The no-op DO UPDATE makes RETURNING yield the existing row; xmax = 0
        // only holds for a freshly inserted tuple.
        let sql = match identity.provider {
            Provider::Google => {
                r#"
                INSERT INTO users (id, google_id)
                VALUES ($1, $2)
                ON CONFLICT (google_id) WHERE google_id IS NOT NULL
                DO UPDATE SET google_id = EXCLUDED.google_id
                RETURNING id, username, password_hash, google_id, facebook_id,
                          secret, last_posted, created_at, (xmax = 0) AS created
                "#
            }
            Provider::Facebook => {
                r#"
                INSERT INTO users (id, facebook_id)
                VALUES ($1, $2)
                ON CONFLICT (facebook_id) WHERE facebook_id IS NOT NULL
                DO UPDATE SET facebook_id = EXCLUDED.facebook_id
                RETURNING id, username, password_hash, google_id, facebook_id,
                          secret, last_posted, created_at, (xmax = 0) AS created
                "#
            }
        };

        let row = self
            .bounded(
                "find or create federated user",
                sqlx::query_as::<_, UpsertedUser>(sql)
                    .bind(Uuid::new_v4())
                    .bind(&identity.external_id)
                    .fetch_one(&self.db),
            )
            .await?;
        Ok((row.user, row.created))
    }

    #[instrument(skip(self, secret))]
    async fn update_secret(&self, id: Uuid, secret: &str) -> Result<User, AppError> {
        self.bounded(
            "update secret",
            sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET secret = $2, last_posted = now()
                WHERE id = $1
                RETURNING id, username, password_hash, google_id, facebook_id,
                          secret, last_posted, created_at
                "#,
            )
            .bind(id)
            .bind(secret)
            .fetch_optional(&self.db),
        )
        .await?
        .ok_or(AppError::NotFound)
    }

    async fn list_with_secret(&self) -> Result<Vec<User>, AppError> {
        self.bounded(
            "list secrets",
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, username, password_hash, google_id, facebook_id,
                       secret, last_posted, created_at
                FROM users
                WHERE secret IS NOT NULL
                ORDER BY last_posted DESC NULLS LAST, created_at DESC
                "#,
            )
            .fetch_all(&self.db),
        )
        .await
    }
}
