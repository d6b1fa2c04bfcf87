use anyhow::Context;
use axum::{routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{
    cookie::{Key, SameSite},
    Expiry, SessionManagerLayer, SessionStore,
};

use crate::{auth, config::AppConfig, home, secrets, state::AppState};

pub const SESSION_COOKIE: &str = "secrets.sid";

pub fn build_app<Store>(state: AppState, session_store: Store) -> anyhow::Result<Router>
where
    Store: SessionStore + Clone,
{
    let key = Key::try_from(state.config.session_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("derive session signing key: {e:?}"))?;
    let sessions = SessionManagerLayer::new(session_store)
        .with_name(SESSION_COOKIE)
        .with_secure(state.config.cookie_secure)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(7)))
        .with_signed(key);

    let static_files = ServeDir::new(&state.config.static_dir);

    Ok(Router::new()
        .route("/", get(home::home))
        .merge(auth::router())
        .merge(secrets::router())
        .fallback_service(static_files)
        .with_state(state)
        .layer(sessions)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        ))
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr = config.listen_addr()?;

    match &config.tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
                .await
                .with_context(|| {
                    format!(
                        "load TLS certificate {} and key {}",
                        tls.cert_path.display(),
                        tls.key_path.display()
                    )
                })?;
            tracing::info!("listening on https://{}", addr);
            axum_server::bind_rustls(addr, rustls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            tracing::warn!("TLS disabled; expecting a terminating proxy in front");
            tracing::info!("listening on http://{}", addr);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app).await?;
        }
    }
    Ok(())
}
