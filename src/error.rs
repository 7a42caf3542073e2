//! Request-boundary error type.
//!
//! Every handler returns `Result<_, ApiError>`; the `IntoResponse` impl is
//! the single place errors become HTTP. Bodies are `{"detail": "..."}` with
//! user-facing Russian wording for the auth outcomes. Server-side failures
//! keep their real cause in the log and send a generic detail out.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::storage::StorageError;
use crate::stripe::GatewayError;

pub const DETAIL_UNAUTHORIZED: &str = "Учетные данные не были предоставлены.";
pub const DETAIL_FORBIDDEN: &str = "У вас недостаточно прав для выполнения данного действия.";
const DETAIL_SERVER_ERROR: &str = "Ошибка сервера.";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{DETAIL_UNAUTHORIZED}")]
    Unauthorized,
    /// Login with an email/password pair that matches no active account.
    #[error("Не найдено активной учетной записи с указанными данными")]
    InvalidCredentials,
    /// Expired or malformed token presented to an auth endpoint.
    #[error("Токен недействителен или просрочен")]
    TokenInvalid,
    #[error("{DETAIL_FORBIDDEN}")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    /// Store-level constraint rejection that no handler chose to catch.
    #[error("{0}")]
    Integrity(String),
    /// Payment provider failed on its own side (5xx or transport).
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(detail: impl Into<String>) -> Self {
        ApiError::Validation(detail.into())
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        ApiError::NotFound(detail.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::TokenInvalid => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Integrity(cause) | ApiError::Internal(cause) => {
                error!(%status, %cause, "request failed");
                DETAIL_SERVER_ERROR.to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => ApiError::NotFound("Страница не найдена.".to_string()),
            StorageError::Conflict(detail) => ApiError::Integrity(detail),
            StorageError::Backend(cause) => ApiError::Internal(cause.to_string()),
            StorageError::Encoding(cause) => ApiError::Internal(cause.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        // Provider 4xx means our request was bad; everything else is their
        // outage and reads as a bad gateway.
        if err.is_client_error() {
            ApiError::Validation(err.to_string())
        } else {
            ApiError::Upstream(err.to_string())
        }
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
