//! Database models for data sources.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, types::Json};

use crate::provider::SourceConfig;
use crate::types::{OrgId, SourceId, UserId};

/// The config's password must already be encrypted.
#[derive(Debug, Clone)]
pub struct SourceCreateDBRequest {
    pub org_id: OrgId,
    pub name: String,
    pub source_type: String,
    pub config: SourceConfig,
    pub created_by: UserId,
}

#[derive(Debug, Clone, Default)]
pub struct SourceUpdateDBRequest {
    pub name: Option<String>,
    pub config: Option<SourceConfig>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SourceDBResponse {
    pub id: SourceId,
    pub org_id: OrgId,
    pub name: String,
    pub source_type: String,
    pub config: Json<SourceConfig>,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SourceFilter {
    pub org_id: OrgId,
    pub skip: i64,
    pub limit: i64,
}
