//! Rendering step-chain outcomes into status codes and JSON bodies.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use cpm_core::DomainError;

use crate::repository::RepositoryError;

pub const OK: u16 = 200;
pub const CREATED: u16 = 201;
pub const BAD_REQUEST: u16 = 400;
pub const NOT_FOUND: u16 = 404;
pub const CONFLICT: u16 = 409;
pub const INTERNAL_SERVER_ERROR: u16 = 500;

/// Error coding carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ResourceNotFound,
    Conflict,
    ServiceError,
}

impl ErrorCode {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorCode::ValidationError => BAD_REQUEST,
            ErrorCode::ResourceNotFound => NOT_FOUND,
            ErrorCode::Conflict => CONFLICT,
            ErrorCode::ServiceError => INTERNAL_SERVER_ERROR,
        }
    }
}

/// A request that contradicts the current state of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConflictError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorItem {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorItem>,
}

/// A rendered response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status_code: u16,
    pub body: Value,
}

impl Response {
    pub fn success<T: Serialize>(status_code: u16, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status_code, body },
            Err(err) => Self::error(&anyhow::Error::new(err).context("response body is not serialisable")),
        }
    }

    pub fn error(err: &anyhow::Error) -> Self {
        let code = error_code(err);
        if code == ErrorCode::ServiceError {
            tracing::error!(error = ?err, "unexpected error while handling request");
        }
        let body = ErrorResponse {
            errors: vec![ErrorItem {
                code,
                message: err.to_string(),
            }],
        };
        Self {
            status_code: code.status_code(),
            body: serde_json::to_value(&body).unwrap_or_else(|_| json!({ "errors": [] })),
        }
    }
}

/// Classify an error by the first recognised cause in its chain.
pub fn error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<RepositoryError>() {
            return match err.root_cause() {
                RepositoryError::AlreadyExists { .. } => ErrorCode::Conflict,
                RepositoryError::NotFound { .. } => ErrorCode::ResourceNotFound,
                _ => ErrorCode::ServiceError,
            };
        }
        if let Some(err) = cause.downcast_ref::<DomainError>() {
            return match err {
                DomainError::NotFound(_) => ErrorCode::ResourceNotFound,
                DomainError::Duplicate(_) => ErrorCode::Conflict,
                _ => ErrorCode::ValidationError,
            };
        }
        if cause.is::<ConflictError>() {
            return ErrorCode::Conflict;
        }
        if cause.is::<serde_json::Error>() {
            return ErrorCode::ValidationError;
        }
    }
    ErrorCode::ServiceError
}
