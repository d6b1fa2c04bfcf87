use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{federated::Provider, oauth::AuthorizeRequest};
use crate::{
    error::AppError,
    users::{User, UserStore},
};

/// Only the user id lives in the session; everything else is re-read per request.
pub const SESSION_USER_ID_KEY: &str = "user_id";
pub const SESSION_OAUTH_KEY: &str = "oauth_pending";

/// Handshake state parked in the session between `/auth/{p}` and its callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOAuth {
    pub provider: Provider,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

impl PendingOAuth {
    pub fn new(provider: Provider, req: &AuthorizeRequest) -> Self {
        Self {
            provider,
            csrf_state: req.csrf_state.clone(),
            pkce_verifier: req.pkce_verifier.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserStore>,
}

impl SessionManager {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Anonymous -> Authenticated. A new session id is issued first.
    pub async fn establish(&self, session: &Session, user_id: Uuid) -> Result<(), AppError> {
        session.cycle_id().await?;
        session.insert(SESSION_USER_ID_KEY, user_id).await?;
        info!(%user_id, "session established");
        Ok(())
    }

    /// Resolve the session to a user. A stale or unreadable session degrades
    /// to anonymous; only store outages are errors.
    pub async fn reconstruct(&self, session: &Session) -> Result<Option<User>, AppError> {
        let user_id = match session.get::<Uuid>(SESSION_USER_ID_KEY).await {
            Ok(Some(id)) => id,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "unreadable session, treating as anonymous");
                self.end(session).await?;
                return Ok(None);
            }
        };

        match self.users.find_by_id(user_id).await? {
            Some(user) => Ok(Some(user)),
            None => {
                warn!(%user_id, "session references a missing user");
                self.end(session).await?;
                Ok(None)
            }
        }
    }

    /// Authenticated -> Anonymous.
    pub async fn end(&self, session: &Session) -> Result<(), AppError> {
        session.flush().await?;
        debug!("session ended");
        Ok(())
    }

    pub async fn begin_oauth(
        &self,
        session: &Session,
        pending: PendingOAuth,
    ) -> Result<(), AppError> {
        session.insert(SESSION_OAUTH_KEY, pending).await?;
        Ok(())
    }

    /// Removes and returns the pending handshake; a state can only be used once.
    pub async fn take_oauth(&self, session: &Session) -> Result<Option<PendingOAuth>, AppError> {
        match session.remove::<PendingOAuth>(SESSION_OAUTH_KEY).await {
            Ok(pending) => Ok(pending),
            Err(e) => {
                warn!(error = %e, "unreadable oauth state in session");
                Ok(None)
            }
        }
    }
}
