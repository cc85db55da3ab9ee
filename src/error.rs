use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::access::DenyReason;
use crate::auth::AuthError;
use crate::db::DbError;
use crate::ingest::IngestError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("login required")]
    Unauthorized,
    #[error("unauthorized download attempt")]
    Forbidden,
    #[error("file not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        tracing::error!(error = ?err, "database error");
        ApiError::Internal
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(message) => ApiError::BadRequest(message),
            AuthError::DuplicateEmail => ApiError::Conflict(AuthError::DuplicateEmail.to_string()),
            AuthError::InvalidCredentials | AuthError::Token => ApiError::Unauthorized,
            AuthError::Hash => ApiError::Internal,
            AuthError::Db(err) => err.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::NoFile => ApiError::BadRequest("please select a file".to_string()),
            IngestError::WriteFailed(err) => {
                tracing::error!(error = %err, "upload write failed");
                ApiError::Internal
            }
            IngestError::RecordFailed(DbError::Integrity(message)) => ApiError::Conflict(message),
            IngestError::RecordFailed(err) => err.into(),
        }
    }
}

impl From<DenyReason> for ApiError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::NotAuthenticated => ApiError::Unauthorized,
            DenyReason::NotOwner => ApiError::Forbidden,
        }
    }
}
