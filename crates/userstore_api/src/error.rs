//! HTTP error taxonomy.
//!
//! Every failure leaves the service as
//! `{"error": {"kind": "<Kind>", "message": "..."}}` with a matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{debug, error};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use userstore_core::{RepoError, StoreError, UserValidationError};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    NotFound(String),
    ConstraintViolation(String),
    Validation(String),
    Store(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::ConstraintViolation(_) => "ConstraintViolation",
            Self::Validation(_) => "ValidationError",
            Self::Store(_) => "StoreError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ConstraintViolation(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::NotFound(message)
            | Self::ConstraintViolation(message)
            | Self::Validation(message)
            | Self::Store(message) => message,
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Repo(err) => err.into(),
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(_) => Self::NotFound(value.to_string()),
            RepoError::Constraint(_) => Self::ConstraintViolation(value.to_string()),
            RepoError::Validation(err) => err.into(),
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<UserValidationError> for ApiError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: &'static str,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(
                "event=http_error module=api status=error kind={} error={}",
                self.kind(),
                self.message()
            );
        } else {
            debug!(
                "event=http_error module=api status=rejected kind={} error={}",
                self.kind(),
                self.message()
            );
        }

        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.message(),
            },
        };
        (status, Json(body)).into_response()
    }
}
