use axum::{extract::State, response::Html};

use crate::{auth::extractors::MaybeUser, error::AppError, state::AppState};

pub async fn home(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Html<String>, AppError> {
    state.views.home(user.is_some())
}
