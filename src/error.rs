use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    credentials::CredentialError,
    models::MessageResponse,
    policy::{Denial, Ineligible},
};

/// AppError
///
/// The HTTP-facing error taxonomy. Handlers never build responses for failures
/// by hand: policy outcomes and collaborator failures are converted into one of
/// these variants and mapped to a status here, in a single place.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed or expired bearer token.
    #[error("authentication required")]
    Unauthenticated,
    /// Login with an unknown email or a wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Authenticated, but the role or ownership rule refused the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    /// A uniqueness rule was violated (e.g. email already registered).
    #[error("conflict: {0}")]
    Conflict(String),
    /// A second registration for the same (student, competition) pair.
    /// Reported as 400 for compatibility with existing clients.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),
    /// Store or credential-service failure. The detail is logged, never returned.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::DuplicateRegistration(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Attaches a caller-facing message to a policy denial, keeping the
    /// 401/403 split decided by the denial reason.
    pub fn denied(denial: Denial, message: &str) -> Self {
        match denial {
            Denial::NotAuthenticated => AppError::Unauthenticated,
            Denial::UnknownRole => AppError::Forbidden("Unauthorized".to_string()),
            Denial::WrongRole | Denial::NotOwner | Denial::OwnershipUnresolved => {
                tracing::debug!(reason = %denial, "request denied");
                AppError::Forbidden(message.to_string())
            }
        }
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "Authentication required".to_string(),
            AppError::InvalidCredentials => "Invalid credentials".to_string(),
            AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::DuplicateRegistration(msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!(error = %detail, "internal error");
        }
        let status = self.status_code();
        (status, Json(MessageResponse::new(self.client_message()))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            if db_err.is_unique_violation() {
                return AppError::Conflict("Resource already exists".to_string());
            }
            if db_err.is_foreign_key_violation() {
                return AppError::Conflict("Resource is still referenced".to_string());
            }
        }
        AppError::Internal(format!("database error: {err}"))
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::InvalidToken => AppError::Unauthenticated,
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        AppError::denied(denial, "Not authorized to perform this action")
    }
}

impl From<Ineligible> for AppError {
    fn from(reason: Ineligible) -> Self {
        match reason {
            Ineligible::DuplicateRegistration => AppError::DuplicateRegistration(reason.to_string()),
            Ineligible::RegistrationClosed
            | Ineligible::CompetitionAlreadyStarted
            | Ineligible::InvalidDates
            | Ineligible::InvalidTransition { .. } => AppError::Validation(reason.to_string()),
        }
    }
}

/// AppJson
///
/// A `Json<T>` wrapper that turns body rejections into `AppError::Validation`,
/// so malformed bodies still get the `{message}` envelope.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        Ok(AppJson(value))
    }
}
