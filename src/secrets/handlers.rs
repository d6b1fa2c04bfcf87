use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use tower_sessions::Session;
use tracing::{info, instrument, warn};

use super::dto::SecretForm;
use crate::{auth::extractors::AuthUser, error::AppError, state::AppState};

pub fn secrets_routes() -> Router<AppState> {
    Router::new()
        .route("/submit", get(submit_form).post(submit))
        .route("/secrets", get(list_secrets))
}

pub async fn submit_form(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Response, AppError> {
    state.views.submit(StatusCode::OK, "", &user)
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn submit(
    State(state): State<AppState>,
    session: Session,
    AuthUser(user): AuthUser,
    Form(form): Form<SecretForm>,
) -> Result<Response, AppError> {
    let text = match form.text() {
        Ok(text) => text,
        Err(e @ AppError::InvalidInput(_)) => {
            return state.views.submit(e.status(), &e.to_string(), &user);
        }
        Err(e) => return Err(e),
    };

    match state.users.update_secret(user.id, text).await {
        Ok(_) => {
            info!("secret stored");
            Ok(Redirect::to("/secrets").into_response())
        }
        Err(AppError::NotFound) => {
            warn!("user vanished before secret was stored");
            state.sessions.end(&session).await?;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e) => Err(e),
    }
}

pub async fn list_secrets(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
) -> Result<Html<String>, AppError> {
    let users = state.users.list_with_secret().await?;
    state.views.secrets(&users)
}
