use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use tower_sessions::Session;
use tracing::{debug, instrument, warn};

use crate::{
    auth::{
        dto::{CredentialsForm, OAuthCallback},
        federated::Provider,
        session::PendingOAuth,
    },
    error::AppError,
    state::AppState,
    users::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", get(register_form).post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
}

pub fn oauth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/{provider}", get(oauth_begin))
        .route("/auth/{provider}/secrets", get(oauth_callback))
}

/// User-facing text for errors that re-render the form instead of failing.
fn form_message(e: &AppError) -> Option<String> {
    match e {
        AppError::DuplicateUsername => Some("That username is already registered.".into()),
        AppError::InvalidCredentials => Some("Invalid username or password.".into()),
        AppError::InvalidInput(msg) => Some(msg.clone()),
        _ => None,
    }
}

pub async fn register_form(State(state): State<AppState>) -> Result<Response, AppError> {
    state.views.credentials_form(
        "register.html",
        StatusCode::OK,
        "",
        "",
        &state.oauth.enabled(),
    )
}

#[instrument(skip(state, session, form))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    let user = match state.credentials.register(&form.username, &form.password).await {
        Ok(user) => user,
        Err(e) => {
            let Some(message) = form_message(&e) else {
                return Err(e);
            };
            return state.views.credentials_form(
                "register.html",
                e.status(),
                &message,
                form.username.trim(),
                &state.oauth.enabled(),
            );
        }
    };

    state.sessions.establish(&session, user.id).await?;
    Ok(Redirect::to("/submit").into_response())
}

pub async fn login_form(State(state): State<AppState>) -> Result<Response, AppError> {
    state.views.credentials_form(
        "login.html",
        StatusCode::OK,
        "",
        "",
        &state.oauth.enabled(),
    )
}

#[instrument(skip(state, session, form))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    let user = match state.credentials.verify(&form.username, &form.password).await {
        Ok(user) => user,
        Err(e) => {
            let Some(message) = form_message(&e) else {
                return Err(e);
            };
            return state.views.credentials_form(
                "login.html",
                e.status(),
                &message,
                form.username.trim(),
                &state.oauth.enabled(),
            );
        }
    };

    state.sessions.establish(&session, user.id).await?;
    Ok(Redirect::to("/submit").into_response())
}

pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Redirect, AppError> {
    state.sessions.end(&session).await?;
    Ok(Redirect::to("/"))
}

#[instrument(skip(state, session))]
pub async fn oauth_begin(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    session: Session,
) -> Result<Response, AppError> {
    let provider: Provider = provider.parse()?;
    let Some(client) = state.oauth.get(provider) else {
        warn!(%provider, "oauth provider not configured");
        return Ok(Redirect::to("/login").into_response());
    };

    let req = client.authorize();
    state
        .sessions
        .begin_oauth(&session, PendingOAuth::new(provider, &req))
        .await?;
    Ok(Redirect::to(&req.url).into_response())
}

#[instrument(skip(state, session, params))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    session: Session,
    Query(params): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    let provider: Provider = provider.parse()?;
    match complete_oauth(&state, &session, provider, params).await {
        Ok(user) => {
            state.sessions.establish(&session, user.id).await?;
            Ok(Redirect::to("/secrets").into_response())
        }
        Err(AppError::UpstreamAuthFailure(reason)) => {
            warn!(%provider, %reason, "oauth login failed");
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => Err(e),
    }
}

async fn complete_oauth(
    state: &AppState,
    session: &Session,
    provider: Provider,
    params: OAuthCallback,
) -> Result<User, AppError> {
    // Consume the pending state first so a failed callback cannot be replayed.
    let pending = state.sessions.take_oauth(session).await?;

    if let Some(error) = params.error {
        return Err(AppError::UpstreamAuthFailure(format!("provider returned {error}")));
    }
    let pending = pending
        .filter(|p| p.provider == provider)
        .ok_or_else(|| AppError::UpstreamAuthFailure("no pending handshake".into()))?;
    let (Some(code), Some(returned_state)) = (params.code, params.state) else {
        return Err(AppError::UpstreamAuthFailure("missing code or state".into()));
    };
    if returned_state != pending.csrf_state {
        return Err(AppError::UpstreamAuthFailure("state mismatch".into()));
    }

    let client = state
        .oauth
        .get(provider)
        .ok_or_else(|| AppError::UpstreamAuthFailure("provider not configured".into()))?;
    let profile = client.exchange(&code, &pending.pkce_verifier).await?;
    debug!(
        provider = %profile.provider,
        name = profile.display_name.as_deref().unwrap_or("-"),
        "provider profile received"
    );
    state
        .federated
        .resolve(profile.provider, &profile.external_id)
        .await
}
