//! Database models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub password_hash: Option<String>,
    pub active: bool,
    pub is_admin: bool,
}

impl UserCreateDBRequest {
    /// A self-registered account: never an admin, active unless activation is required.
    pub fn registration(username: String, email: String, password_hash: String, active: bool) -> Self {
        Self {
            username,
            email,
            name: None,
            avatar: None,
            description: None,
            password_hash: Some(password_hash),
            active,
            is_admin: false,
        }
    }
}

/// Database request for updating a user. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub password_hash: Option<String>,
    pub active: Option<bool>,
}

/// Database response for a user
#[derive(Debug, Clone, FromRow)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub description: Option<String>,
    pub password_hash: Option<String>,
    pub active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}
