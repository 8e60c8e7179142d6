//! Database models for organizations and their members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::types::{OrgId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum MemberRole {
    Owner,
    Member,
}

/// Creating an organization also makes `created_by` its first owner.
#[derive(Debug, Clone)]
pub struct OrganizationCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub created_by: UserId,
}

#[derive(Debug, Clone, Default)]
pub struct OrganizationUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OrganizationDBResponse {
    pub id: OrgId,
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for listing organizations
#[derive(Debug, Clone)]
pub struct OrganizationFilter {
    /// Only organizations this user belongs to
    pub member_id: Option<UserId>,
    pub skip: i64,
    pub limit: i64,
}

/// A membership row joined with the member's account details.
#[derive(Debug, Clone, FromRow)]
pub struct OrgMemberDBResponse {
    pub org_id: OrgId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub created_at: DateTime<Utc>,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}
