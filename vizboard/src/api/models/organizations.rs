//! API request/response models for organizations and their members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::organizations::{MemberRole, OrgMemberDBResponse, OrganizationDBResponse};
use crate::types::{OrgId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationCreate {
    /// Must be unique across the server
    #[schema(example = "Sales Analytics")]
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrganizationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: OrgId,
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrganizationDBResponse> for OrganizationResponse {
    fn from(db: OrganizationDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            avatar: db.avatar,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Optional body for adding a member. Defaults to the MEMBER role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub role: Option<MemberRole>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrgMemberResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

impl From<OrgMemberDBResponse> for OrgMemberResponse {
    fn from(db: OrgMemberDBResponse) -> Self {
        Self {
            user_id: db.user_id,
            username: db.username,
            email: db.email,
            name: db.name,
            avatar: db.avatar,
            role: db.role,
            joined_at: db.created_at,
        }
    }
}
