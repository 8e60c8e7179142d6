//! The JSON envelope every endpoint responds with.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// `{ success, error_code, message, data }`.
///
/// Successful responses carry `data` with `error_code` and `message` set to null. Failures carry
/// the HTTP status in `error_code`, a user-safe `message` and null `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ResponseData<T> {
    pub success: bool,
    pub error_code: Option<u16>,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ResponseData<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            error_code: None,
            message: None,
            data: Some(data),
        }
    }
}

impl ResponseData<()> {
    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code: Some(status.as_u16()),
            message: Some(message.into()),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ResponseData<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
