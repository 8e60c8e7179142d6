//! Database models for single-use user tokens (activation and password reset).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenPurpose {
    Activation,
    PasswordReset,
}

/// Request for storing a token. The raw token and verify code are hashed by the caller.
#[derive(Debug, Clone)]
pub struct UserTokenCreateDBRequest {
    /// Chosen up front because it is embedded in the opaque token handed to the user
    pub id: Uuid,
    pub user_id: UserId,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub verify_code_hash: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserTokenUpdateDBRequest {
    pub used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserTokenDBResponse {
    pub id: Uuid,
    pub user_id: UserId,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub verify_code_hash: Option<String>,
    /// Wrong verify codes submitted against this token
    pub failed_attempts: i64,
    pub expires_at: DateTime<Utc>,
    #[allow(dead_code)]
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl UserTokenDBResponse {
    /// Unused and not yet expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.used_at.is_none() && now <= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct UserTokenFilter {
    pub user_id: Option<UserId>,
    pub purpose: Option<TokenPurpose>,
    pub skip: i64,
    pub limit: i64,
}
