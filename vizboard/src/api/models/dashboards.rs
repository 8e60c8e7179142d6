//! API request/response models for dashboards and their widgets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::rust::double_option;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::api::models::folders::FolderResponse;
use crate::db::models::dashboards::{DashboardDBResponse, DashboardStatus, WidgetDBResponse};
use crate::types::{DashboardId, FolderId, OrgId, UserId, WidgetId};

/// Create a dashboard together with its entry in the folder tree.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardCreate {
    #[schema(value_type = String, format = "uuid")]
    pub org_id: OrgId,
    #[schema(example = "Revenue overview")]
    pub name: String,
    /// Folder to place the dashboard in; null for the root
    #[schema(value_type = Option<String>, format = "uuid")]
    pub parent_id: Option<FolderId>,
    pub index: Option<f64>,
    #[schema(value_type = Option<Object>)]
    pub config: Option<Value>,
    pub thumbnail: Option<String>,
}

/// Dashboard fields without config or widgets, as returned by list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardBaseInfo {
    #[schema(value_type = String, format = "uuid")]
    pub id: DashboardId,
    #[schema(value_type = String, format = "uuid")]
    pub org_id: OrgId,
    pub name: String,
    pub thumbnail: Option<String>,
    pub status: DashboardStatus,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&DashboardDBResponse> for DashboardBaseInfo {
    fn from(db: &DashboardDBResponse) -> Self {
        Self {
            id: db.id,
            org_id: db.org_id,
            name: db.name.clone(),
            thumbnail: db.thumbnail.clone(),
            status: db.status,
            created_by: db.created_by,
            updated_by: db.updated_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WidgetResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: WidgetId,
    #[schema(value_type = String, format = "uuid")]
    pub dashboard_id: DashboardId,
    #[schema(value_type = Object)]
    pub config: Value,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub parent_id: Option<WidgetId>,
    #[schema(value_type = Vec<String>)]
    pub view_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WidgetDBResponse> for WidgetResponse {
    fn from(db: WidgetDBResponse) -> Self {
        Self {
            id: db.id,
            dashboard_id: db.dashboard_id,
            config: db.config.0,
            parent_id: db.parent_id,
            view_ids: db.view_ids.0,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Everything needed to render a dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DashboardDetail {
    #[serde(flatten)]
    pub dashboard: DashboardBaseInfo,
    #[schema(value_type = Option<Object>)]
    pub config: Option<Value>,
    pub widgets: Vec<WidgetResponse>,
    /// Tree entry; absent while the dashboard is archived
    pub folder: Option<FolderResponse>,
}

impl DashboardDetail {
    pub fn new(db: DashboardDBResponse, widgets: Vec<WidgetResponse>, folder: Option<FolderResponse>) -> Self {
        Self {
            dashboard: DashboardBaseInfo::from(&db),
            config: db.config.map(|c| c.0),
            widgets,
            folder,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WidgetCreate {
    #[schema(value_type = Object)]
    pub config: Value,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub parent_id: Option<WidgetId>,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub view_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WidgetUpdate {
    #[schema(value_type = String, format = "uuid")]
    pub id: WidgetId,
    #[schema(value_type = Option<Object>)]
    pub config: Option<Value>,
    /// Parent widget (None = no change, Some(None) = detach)
    #[serde(default, skip_serializing_if = "Option::is_none", with = "double_option")]
    #[schema(value_type = Option<String>, format = "uuid")]
    pub parent_id: Option<Option<WidgetId>>,
    #[schema(value_type = Option<Vec<String>>)]
    pub view_ids: Option<Vec<Uuid>>,
}

/// Dashboard update plus widget changes, applied atomically.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DashboardUpdate {
    pub name: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub config: Option<Value>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub widgets_to_create: Vec<WidgetCreate>,
    #[serde(default)]
    pub widgets_to_update: Vec<WidgetUpdate>,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub widgets_to_delete: Vec<WidgetId>,
}

/// Where to put a restored dashboard back in the tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RestoreRequest {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub parent_id: Option<FolderId>,
    /// Rename on restore, e.g. when the old name is now taken
    pub name: Option<String>,
    pub index: Option<f64>,
}

fn default_archive() -> bool {
    true
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeleteDashboardQuery {
    /// Archive instead of deleting (default: true)
    #[serde(default = "default_archive")]
    #[param(default = true)]
    pub archive: bool,
}
