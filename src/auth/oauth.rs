//! OAuth 2.0 authorization-code flow (with PKCE) for Google and Facebook.
//!
//! The handshake is the only part that talks to providers. It ends with a
//! verified [`ExternalProfile`], which the handlers pass to
//! [`FederatedResolver`](super::federated::FederatedResolver). Handlers only see
//! the [`OAuthProvider`] trait so tests can swap in a fake.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::federated::{ExternalProfile, Provider};
use crate::{config::OAuthAppConfig, error::AppError};

/// Where to send the browser, plus what the callback must see again.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub url: String,
    pub csrf_state: String,
    pub pkce_verifier: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn provider(&self) -> Provider;

    fn authorize(&self) -> AuthorizeRequest;

    /// Trade the callback code for a token and fetch the provider profile.
    async fn exchange(&self, code: &str, pkce_verifier: &str)
        -> Result<ExternalProfile, AppError>;
}

struct Endpoints {
    auth_url: &'static str,
    token_url: &'static str,
    profile_url: &'static str,
    scopes: &'static [&'static str],
    auth_type: AuthType,
}

fn endpoints(provider: Provider) -> Endpoints {
    match provider {
        Provider::Google => Endpoints {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            profile_url: "https://www.googleapis.com/oauth2/v2/userinfo",
            scopes: &["email", "profile"],
            auth_type: AuthType::BasicAuth,
        },
        // Facebook wants client credentials as form fields.
        Provider::Facebook => Endpoints {
            auth_url: "https://www.facebook.com/v19.0/dialog/oauth",
            token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
            profile_url: "https://graph.facebook.com/me?fields=id,name",
            scopes: &[],
            auth_type: AuthType::RequestBody,
        },
    }
}

type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct OAuthClient {
    provider: Provider,
    client: ConfiguredClient,
    profile_url: &'static str,
    scopes: &'static [&'static str],
    http: reqwest::Client,
}

impl OAuthClient {
    pub fn new(app: &OAuthAppConfig, redirect_url: String) -> anyhow::Result<Self> {
        let ep = endpoints(app.provider);
        let client = BasicClient::new(ClientId::new(app.client_id.clone()))
            .set_client_secret(ClientSecret::new(app.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(ep.auth_url.to_string()).context("auth url")?)
            .set_token_uri(TokenUrl::new(ep.token_url.to_string()).context("token url")?)
            .set_redirect_uri(RedirectUrl::new(redirect_url).context("redirect url")?)
            .set_auth_type(ep.auth_type);

        // No redirects on the token endpoint, per the oauth2 crate's guidance.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(10))
            .build()
            .context("build oauth http client")?;

        Ok(Self {
            provider: app.provider,
            client,
            profile_url: ep.profile_url,
            scopes: ep.scopes,
            http,
        })
    }
}

#[async_trait]
impl OAuthProvider for OAuthClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn authorize(&self) -> AuthorizeRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let mut req = self
            .client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);
        for scope in self.scopes {
            req = req.add_scope(Scope::new(scope.to_string()));
        }
        let (url, csrf_state) = req.url();
        AuthorizeRequest {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    #[instrument(skip_all, fields(provider = %self.provider))]
    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ExternalProfile, AppError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| AppError::UpstreamAuthFailure(format!("token exchange failed: {e}")))?;

        let body = self
            .http
            .get(self.profile_url)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::UpstreamAuthFailure(format!("profile request failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| AppError::UpstreamAuthFailure(format!("profile body: {e}")))?;

        let profile = profile_from_json(self.provider, &body)?;
        debug!(provider = %self.provider, "provider profile fetched");
        Ok(profile)
    }
}

#[derive(Debug, Deserialize)]
struct GoogleProfile {
    // v2 userinfo calls it `id`, the OpenID endpoint `sub`.
    #[serde(alias = "sub")]
    id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FacebookProfile {
    id: String,
    name: Option<String>,
}

/// Pull `(provider, external_id)` out of each provider's profile document.
pub(crate) fn profile_from_json(
    provider: Provider,
    body: &[u8],
) -> Result<ExternalProfile, AppError> {
    let bad = |e: serde_json::Error| AppError::UpstreamAuthFailure(format!("profile json: {e}"));
    let (external_id, display_name) = match provider {
        Provider::Google => {
            let p: GoogleProfile = serde_json::from_slice(body).map_err(bad)?;
            (p.id, p.name)
        }
        Provider::Facebook => {
            let p: FacebookProfile = serde_json::from_slice(body).map_err(bad)?;
            (p.id, p.name)
        }
    };
    if external_id.is_empty() {
        return Err(AppError::UpstreamAuthFailure("profile without id".into()));
    }
    Ok(ExternalProfile {
        provider,
        external_id,
        display_name,
    })
}

/// Providers that have credentials configured.
#[derive(Clone, Default)]
pub struct OAuthProviders {
    by_provider: HashMap<Provider, Arc<dyn OAuthProvider>>,
}

impl OAuthProviders {
    pub fn from_config(config: &crate::config::AppConfig) -> anyhow::Result<Self> {
        let mut providers = Self::default();
        for app in &config.oauth {
            let client = OAuthClient::new(app, config.redirect_url(app.provider))
                .with_context(|| format!("configure {} oauth", app.provider))?;
            providers.insert(Arc::new(client));
        }
        Ok(providers)
    }

    pub fn insert(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.by_provider.insert(provider.provider(), provider);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn OAuthProvider>> {
        self.by_provider.get(&provider).cloned()
    }

    /// Configured providers in a stable display order.
    pub fn enabled(&self) -> Vec<Provider> {
        [Provider::Google, Provider::Facebook]
            .into_iter()
            .filter(|p| self.by_provider.contains_key(p))
            .collect()
    }
}
