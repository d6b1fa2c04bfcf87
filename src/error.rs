use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("username already taken")]
    DuplicateUsername,
    /// Same variant for unknown user and wrong password.
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    InvalidInput(String),
    #[error("not found")]
    NotFound,
    #[error("upstream authentication failed: {0}")]
    UpstreamAuthFailure(String),
    #[error("store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
    #[error("session error")]
    Session(#[from] tower_sessions::session::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::DuplicateUsername => StatusCode::CONFLICT,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::UpstreamAuthFailure(_) => StatusCode::SEE_OTHER,
            AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Session(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::UpstreamAuthFailure(reason) => {
                warn!(%reason, "oauth failure, sending to login");
                Redirect::to("/login").into_response()
            }
            AppError::StoreUnavailable(ref e) => {
                error!(error = ?e, "store unavailable");
                (status, Html(error_page("The service is temporarily unavailable."))).into_response()
            }
            AppError::Session(ref e) => {
                error!(error = %e, "session store error");
                (status, Html(error_page("Something went wrong."))).into_response()
            }
            AppError::Internal(ref e) => {
                error!(error = ?e, "internal error");
                (status, Html(error_page("Something went wrong."))).into_response()
            }
            AppError::NotFound => (status, Html(error_page("Page not found."))).into_response(),
            other => (status, Html(error_page(&other.to_string()))).into_response(),
        }
    }
}

// Static fallback so error responses never depend on the template engine.
fn error_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Secrets</title></head>\
         <body><h1>{}</h1><p><a href=\"/\">Back to home</a></p></body></html>",
        tera::escape_html(message)
    )
}
