//! Database models for dashboards and their widgets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, types::Json};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::types::{DashboardId, OrgId, UserId, WidgetId};

/// Lifecycle of a dashboard, stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[repr(i32)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DashboardStatus {
    Archived = 0,
    Active = 1,
    Published = 2,
}

#[derive(Debug, Clone)]
pub struct DashboardCreateDBRequest {
    pub org_id: OrgId,
    pub name: String,
    pub config: Option<Value>,
    pub thumbnail: Option<String>,
    pub created_by: UserId,
}

#[derive(Debug, Clone)]
pub struct DashboardUpdateDBRequest {
    pub name: Option<String>,
    pub config: Option<Value>,
    pub thumbnail: Option<String>,
    pub status: Option<DashboardStatus>,
    pub updated_by: UserId,
}

impl DashboardUpdateDBRequest {
    pub fn status(status: DashboardStatus, updated_by: UserId) -> Self {
        Self {
            name: None,
            config: None,
            thumbnail: None,
            status: Some(status),
            updated_by,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DashboardDBResponse {
    pub id: DashboardId,
    pub org_id: OrgId,
    pub name: String,
    pub config: Option<Json<Value>>,
    pub thumbnail: Option<String>,
    pub status: DashboardStatus,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DashboardFilter {
    pub org_id: OrgId,
    pub statuses: Vec<DashboardStatus>,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Clone)]
pub struct WidgetCreateDBRequest {
    pub dashboard_id: DashboardId,
    pub config: Value,
    pub parent_id: Option<WidgetId>,
    pub view_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct WidgetUpdateDBRequest {
    pub config: Option<Value>,
    pub parent_id: Option<Option<WidgetId>>,
    pub view_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct WidgetDBResponse {
    pub id: WidgetId,
    pub dashboard_id: DashboardId,
    pub config: Json<Value>,
    pub parent_id: Option<WidgetId>,
    pub view_ids: Json<Vec<Uuid>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct WidgetFilter {
    pub dashboard_id: DashboardId,
}
