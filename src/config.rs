use std::{fmt, net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{bail, Context};

use crate::auth::federated::Provider;

/// Minimum length accepted for `SESSION_SECRET`; the cookie signing key needs 64 bytes.
pub const MIN_SESSION_SECRET_LEN: usize = 64;

#[derive(Clone)]
pub struct OAuthAppConfig {
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for OAuthAppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthAppConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub session_secret: String,
    pub host: String,
    pub port: u16,
    pub public_base_url: String,
    pub oauth: Vec<OAuthAppConfig>,
    pub static_dir: PathBuf,
    pub store_timeout: Duration,
    pub tls: Option<TlsConfig>,
    /// Secure flag on the session cookie. Stays on when TLS terminates at a proxy.
    pub cookie_secure: bool,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<redacted>")
            .field("session_secret", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_base_url", &self.public_base_url)
            .field("oauth", &self.oauth)
            .field("static_dir", &self.static_dir)
            .field("store_timeout", &self.store_timeout)
            .field("tls", &self.tls)
            .field("cookie_secure", &self.cookie_secure)
            .finish()
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "off" | "no")
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").context("DATABASE_URL is not set")?;

        let Some(session_secret) = get("SESSION_SECRET") else {
            bail!("SESSION_SECRET is not set; refusing to start without a session signing secret");
        };
        if session_secret.len() < MIN_SESSION_SECRET_LEN {
            bail!(
                "SESSION_SECRET must be at least {} bytes long (got {})",
                MIN_SESSION_SECRET_LEN,
                session_secret.len()
            );
        }

        let port = match get("APP_PORT").or_else(|| get("PORT")) {
            Some(v) => v.parse::<u16>().with_context(|| format!("invalid port {v:?}"))?,
            None => 3000,
        };

        let store_timeout = get("STORE_TIMEOUT_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(5));

        let tls_enabled = get("TLS_ENABLED").map(|v| parse_flag(&v)).unwrap_or(true);
        let cookie_secure = get("COOKIE_SECURE").map(|v| parse_flag(&v)).unwrap_or(true);
        let tls = tls_enabled.then(|| TlsConfig {
            cert_path: get("TLS_CERT_PATH")
                .unwrap_or_else(|| "tls/server.crt".into())
                .into(),
            key_path: get("TLS_KEY_PATH")
                .unwrap_or_else(|| "tls/server.key".into())
                .into(),
        });

        let mut oauth = Vec::new();
        for (provider, id_key, secret_key) in [
            (Provider::Google, "GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            (Provider::Facebook, "FACEBOOK_APP_ID", "FACEBOOK_APP_SECRET"),
        ] {
            match (get(id_key), get(secret_key)) {
                (Some(client_id), Some(client_secret)) => oauth.push(OAuthAppConfig {
                    provider,
                    client_id,
                    client_secret,
                }),
                (None, None) => {}
                _ => bail!("{id_key} and {secret_key} must be set together"),
            }
        }

        Ok(Self {
            database_url,
            session_secret,
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "https://localhost:3000".into())
                .trim_end_matches('/')
                .to_string(),
            oauth,
            static_dir: get("STATIC_DIR").unwrap_or_else(|| "public".into()).into(),
            store_timeout,
            tls,
            cookie_secure,
        })
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn redirect_url(&self, provider: Provider) -> String {
        format!("{}/auth/{}/secrets", self.public_base_url, provider)
    }
}
