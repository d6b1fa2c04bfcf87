use anyhow::Context;
use tower_sessions::ExpiredDeletion;
use tower_sessions_sqlx_store::PostgresStore;

mod app;
mod auth;
mod config;
mod error;
mod home;
mod secrets;
mod state;
mod users;
mod views;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "secrets_board=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // Both ring and aws-lc end up in the tree; pick one for the TLS listener.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let app_state = AppState::init().await?;

    sqlx::migrate!("./migrations")
        .run(&app_state.db)
        .await
        .context("run migrations")?;

    let session_store = PostgresStore::new(app_state.db.clone());
    session_store
        .migrate()
        .await
        .context("migrate session store")?;
    let deletion_task = tokio::task::spawn(
        session_store
            .clone()
            .continuously_delete_expired(tokio::time::Duration::from_secs(60)),
    );

    let config = app_state.config.clone();
    let app = app::build_app(app_state, session_store)?;
    app::serve(app, &config).await?;

    deletion_task.abort();
    Ok(())
}
