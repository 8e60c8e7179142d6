//! Database models for the folder tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{FolderId, OrgId, UserId};

/// What a folder-tree entry stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum RelType {
    /// A plain folder that can hold other entries
    Folder,
    /// A leaf pointing at a dashboard through `rel_id`
    Dashboard,
}

#[derive(Debug, Clone)]
pub struct FolderCreateDBRequest {
    pub org_id: OrgId,
    pub name: String,
    pub rel_type: RelType,
    pub rel_id: Option<Uuid>,
    pub parent_id: Option<FolderId>,
    pub idx: f64,
    pub created_by: UserId,
}

/// Rename or move an entry. `parent_id: Some(None)` moves it to the root.
#[derive(Debug, Clone, Default)]
pub struct FolderUpdateDBRequest {
    pub name: Option<String>,
    pub parent_id: Option<Option<FolderId>>,
    pub idx: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FolderDBResponse {
    pub id: FolderId,
    pub org_id: OrgId,
    pub name: String,
    pub rel_type: RelType,
    pub rel_id: Option<Uuid>,
    pub parent_id: Option<FolderId>,
    pub idx: f64,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FolderFilter {
    pub org_id: OrgId,
    pub rel_type: Option<RelType>,
}
