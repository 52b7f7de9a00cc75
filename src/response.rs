//! Standard response envelope: `{success, data?, message?, error?, details?}`.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Failure envelope; `success` is always false.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorBody {
    pub fn message(message: impl Into<String>) -> Self {
        ErrorBody {
            success: false,
            message: message.into(),
            error: None,
            details: None,
        }
    }

    pub fn with_error(message: impl Into<String>, error: String) -> Self {
        ErrorBody {
            error: Some(error),
            ..Self::message(message)
        }
    }

    pub fn with_details(message: impl Into<String>, details: Vec<String>) -> Self {
        ErrorBody {
            details: Some(details),
            ..Self::message(message)
        }
    }
}

/// 200 with `data` only (list and fetch).
pub fn success_data<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            message: None,
            data: Some(data),
        }),
    )
}

/// 201 with message and the created record.
pub fn success_created<T: Serialize>(message: String, data: T) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::CREATED,
        Json(Envelope {
            success: true,
            message: Some(message),
            data: Some(data),
        }),
    )
}

/// 200 with message and the updated record.
pub fn success_updated<T: Serialize>(message: String, data: T) -> (StatusCode, Json<Envelope<T>>) {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            message: Some(message),
            data: Some(data),
        }),
    )
}

/// 200 with message only (delete).
pub fn success_message(message: String) -> (StatusCode, Json<Envelope<()>>) {
    (
        StatusCode::OK,
        Json(Envelope {
            success: true,
            message: Some(message),
            data: None,
        }),
    )
}
