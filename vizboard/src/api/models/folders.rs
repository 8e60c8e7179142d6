//! API request/response models for the folder tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::rust::double_option;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::db::models::folders::{FolderDBResponse, RelType};
use crate::types::{FolderId, OrgId, UserId};

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrgQuery {
    #[param(value_type = String, format = "uuid")]
    pub org_id: OrgId,
}

/// Request body for creating a plain folder.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FolderCreate {
    #[schema(value_type = String, format = "uuid")]
    pub org_id: OrgId,
    #[schema(example = "Quarterly reports")]
    pub name: String,
    /// Parent folder; null for the root
    #[schema(value_type = Option<String>, format = "uuid")]
    pub parent_id: Option<FolderId>,
    /// Position among siblings; appended after the last sibling when omitted
    pub index: Option<f64>,
}

/// Rename or move a tree entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct FolderUpdate {
    pub name: Option<String>,
    /// Parent folder (None = no change, Some(None) = move to root, Some(id) = move under id)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub parent_id: Option<Option<FolderId>>,
    pub index: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FolderResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: FolderId,
    #[schema(value_type = String, format = "uuid")]
    pub org_id: OrgId,
    pub name: String,
    pub rel_type: RelType,
    /// Dashboard id for DASHBOARD entries
    #[schema(value_type = Option<String>, format = "uuid")]
    pub rel_id: Option<Uuid>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub parent_id: Option<FolderId>,
    pub index: f64,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FolderDBResponse> for FolderResponse {
    fn from(db: FolderDBResponse) -> Self {
        Self {
            id: db.id,
            org_id: db.org_id,
            name: db.name,
            rel_type: db.rel_type,
            rel_id: db.rel_id,
            parent_id: db.parent_id,
            index: db.idx,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
