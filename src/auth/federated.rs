use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    error::AppError,
    users::{FederatedId, User, UserStore},
};

/// Supported third-party identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Facebook,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Facebook => "facebook",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Provider::Google => "Google",
            Provider::Facebook => "Facebook",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            "facebook" => Ok(Provider::Facebook),
            _ => Err(AppError::NotFound),
        }
    }
}

/// Profile handed over by a provider after a verified code exchange.
#[derive(Debug, Clone)]
pub struct ExternalProfile {
    pub provider: Provider,
    pub external_id: String,
    pub display_name: Option<String>,
}

/// Maps verified provider identities onto local users.
#[derive(Clone)]
pub struct FederatedResolver {
    users: Arc<dyn UserStore>,
}

impl FederatedResolver {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    #[instrument(skip(self, external_id))]
    pub async fn resolve(&self, provider: Provider, external_id: &str) -> Result<User, AppError> {
        if external_id.is_empty() {
            return Err(AppError::UpstreamAuthFailure("provider returned an empty id".into()));
        }
        let identity = FederatedId {
            provider,
            external_id: external_id.to_string(),
        };
        let (user, created) = self.users.find_or_create(&identity).await?;
        if user.external_id(provider) != Some(external_id) {
            return Err(AppError::Internal(anyhow::anyhow!(
                "store returned a user without the requested {provider} id"
            )));
        }
        if created {
            info!(user_id = %user.id, "federated account created");
        } else {
            info!(user_id = %user.id, "federated account resolved");
        }
        Ok(user)
    }
}
