use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::federated::Provider;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: Option<String>, // None for OAuth-only accounts
    pub password_hash: Option<String>, // Argon2 PHC string, salt included
    pub google_id: Option<String>,
    pub facebook_id: Option<String>,
    pub secret: Option<String>,
    pub last_posted: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn external_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Google => self.google_id.as_deref(),
            Provider::Facebook => self.facebook_id.as_deref(),
        }
    }
}

/// Local account about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
}

/// Provider-issued subject id, the find-or-create key for federated accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FederatedId {
    pub provider: Provider,
    pub external_id: String,
}

/// Row returned by the find-or-create upsert.
#[derive(Debug, FromRow)]
pub(crate) struct UpsertedUser {
    #[sqlx(flatten)]
    pub user: User,
    pub created: bool,
}
