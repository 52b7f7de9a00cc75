//! Typed errors and HTTP mapping.

use crate::response::ErrorBody;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("resource {resource}: field '{field}' is reserved")]
    ReservedField { resource: String, field: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("invalid setting {name}: {message}")]
    Setting { name: &'static str, message: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Every violated constraint of a payload, in field order.
    #[error("validation error: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("{0}")]
    DuplicateKey(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PreconditionFailed(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("endpoint not found")]
    RouteNotFound,
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    /// A database failure annotated with the operation that hit it.
    #[error("{message}: {source}")]
    Backend {
        message: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("internal server error")]
    Internal,
}

impl AppError {
    /// Attach the failing operation ("Error creating Post") to a raw database error.
    pub fn context(self, message: impl Into<String>) -> Self {
        match self {
            AppError::Db(source) => AppError::Backend {
                message: message.into(),
                source,
            },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::DuplicateKey(_)
            | AppError::PreconditionFailed(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::RouteNotFound => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Db(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            AppError::Config(_) | AppError::Db(_) | AppError::Backend { .. } | AppError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Pool exhaustion, closed pool, socket and TLS failures.
fn is_connectivity(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_)
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(details) => ErrorBody::with_details("Validation error", details),
            AppError::DuplicateKey(message)
            | AppError::NotFound(message)
            | AppError::PreconditionFailed(message) => ErrorBody::message(message),
            AppError::BadRequest(message) => ErrorBody::message(message),
            AppError::RouteNotFound => ErrorBody::message("Endpoint not found"),
            AppError::PayloadTooLarge => ErrorBody::message("Request body too large"),
            AppError::Db(sqlx::Error::RowNotFound) => ErrorBody::message("Record not found"),
            AppError::Db(e) => {
                tracing::error!(error = %e, "database error");
                if is_connectivity(&e) {
                    ErrorBody::message("Database connection error")
                } else {
                    ErrorBody::with_error("Internal server error", e.to_string())
                }
            }
            AppError::Backend { message, source } => {
                tracing::error!(error = %source, "{}", message);
                if is_connectivity(&source) {
                    ErrorBody::message("Database connection error")
                } else {
                    ErrorBody::with_error(message, source.to_string())
                }
            }
            AppError::Config(e) => {
                tracing::error!(error = %e, "config error");
                ErrorBody::message("Internal server error")
            }
            AppError::Internal => ErrorBody::message("Internal server error"),
        };
        (status, Json(body)).into_response()
    }
}
