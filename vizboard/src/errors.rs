use crate::api::models::response::ResponseData;
use crate::db::errors::DbError;
use crate::provider::DataProviderError;
use crate::types::{Operation, Permission, Resource};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// User lacks required permissions for the operation
    #[error("Insufficient permissions to {action} {resource} (requires {required:?})")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: Resource,
    },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Data source connection or query error
    #[error(transparent)]
    DataProvider(#[from] DataProviderError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Conflict with the current state of a resource
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

/// Friendly text for unique violations the UI can trigger.
fn unique_violation_message(table: Option<&str>, constraint: Option<&str>) -> &'static str {
    match (table, constraint) {
        (Some("users"), Some(c)) if c.contains("email") => "An account with this email address already exists",
        (Some("users"), Some(c)) if c.contains("username") => "This username is already taken",
        (Some("sources"), Some(c)) if c.contains("name") => "A source with this name already exists in the organization",
        (Some("organizations"), Some(c)) if c.contains("name") => "An organization with this name already exists",
        (Some("org_members"), _) => "The user is already a member of this organization",
        _ => "Resource already exists",
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::DataProvider(provider_err) => match provider_err {
                DataProviderError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                DataProviderError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource, .. } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => {
                    unique_violation_message(table.as_deref(), constraint.as_deref()).to_string()
                }
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            // Driver messages are what users need to fix their SQL or connection settings
            Error::DataProvider(DataProviderError::Other(_)) => "Internal server error".to_string(),
            Error::DataProvider(provider_err) => provider_err.to_string(),
            Error::Other(_) => "Internal server error".to_string(),
            Error::Conflict { message } => message.clone(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_))
            | Error::DataProvider(DataProviderError::Other(_))
            | Error::Internal { .. }
            | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::DataProvider(DataProviderError::Connection { .. } | DataProviderError::Timeout { .. }) => {
                tracing::warn!("Data source error: {}", self);
            }
            Error::DataProvider(_) => {
                tracing::debug!("Data source client error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();
        (status, ResponseData::<()>::failure(status, self.user_message())).into_response()
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::time::Duration;

    async fn body_json(error: Error) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_error_renders_failure_envelope() {
        let (status, body) = body_json(Error::BadRequest {
            message: "token is blank".to_string(),
        })
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_code"], 400);
        assert_eq!(body["message"], "token is blank");
        assert!(body["data"].is_null());
    }

    #[tokio::test]
    async fn test_internal_details_are_hidden() {
        let (status, body) = body_json(Error::Other(anyhow::anyhow!("connection string postgres://secret"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[test]
    fn test_unique_violation_messages() {
        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("email".to_string()),
            table: Some("users".to_string()),
            message: "UNIQUE constraint failed: users.email".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.user_message(), "An account with this email address already exists");

        let err = Error::Database(DbError::UniqueViolation {
            constraint: Some("org_id,name".to_string()),
            table: Some("sources".to_string()),
            message: String::new(),
        });
        assert_eq!(err.user_message(), "A source with this name already exists in the organization");
    }

    #[test]
    fn test_data_provider_status_codes() {
        let mismatch = Error::from(DataProviderError::DialectMismatch {
            db_type: "oracle".to_string(),
        });
        assert_eq!(mismatch.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(mismatch.user_message(), "Dbtype oracle mismatched");

        let timeout = Error::from(DataProviderError::Timeout {
            after: Duration::from_secs(30),
        });
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let other = Error::from(DataProviderError::Other(anyhow::anyhow!("boom")));
        assert_eq!(other.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(other.user_message(), "Internal server error");
    }

    #[test]
    fn test_insufficient_permissions_message() {
        let err = Error::InsufficientPermissions {
            required: Permission::OrgOwner,
            action: Operation::Update,
            resource: Resource::Sources,
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.user_message(), "Insufficient permissions to update sources");
    }
}
