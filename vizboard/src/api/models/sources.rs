//! API request/response models for data sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::sources::SourceDBResponse;
use crate::provider::{JDBC_PROVIDER_TYPE, SourceConfig};
use crate::types::{OrgId, SourceId, UserId};

fn default_source_type() -> String {
    JDBC_PROVIDER_TYPE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SourceCreate {
    #[schema(value_type = String, format = "uuid")]
    pub org_id: OrgId,
    #[schema(example = "Warehouse")]
    pub name: String,
    #[serde(rename = "type", default = "default_source_type")]
    pub source_type: String,
    pub config: SourceConfig,
}

/// Omitted fields are left untouched. A config without a password keeps the stored one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub config: Option<SourceConfig>,
}

/// Source connection settings as returned to clients. The password never leaves the server.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SourceConfigView {
    pub url: String,
    pub user: Option<String>,
    pub db_type: Option<String>,
    pub server_paging: bool,
    pub has_password: bool,
}

impl From<&SourceConfig> for SourceConfigView {
    fn from(config: &SourceConfig) -> Self {
        Self {
            url: config.url.clone(),
            user: config.user.clone(),
            db_type: config.db_type.clone(),
            server_paging: config.server_paging,
            has_password: config.password.as_deref().is_some_and(|p| !p.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SourceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: SourceId,
    #[schema(value_type = String, format = "uuid")]
    pub org_id: OrgId,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: String,
    pub config: SourceConfigView,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SourceDBResponse> for SourceResponse {
    fn from(db: SourceDBResponse) -> Self {
        Self {
            id: db.id,
            org_id: db.org_id,
            name: db.name,
            source_type: db.source_type,
            config: SourceConfigView::from(&db.config.0),
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_defaults_to_jdbc() {
        let create: SourceCreate = serde_json::from_value(serde_json::json!({
            "org_id": uuid::Uuid::new_v4(),
            "name": "warehouse",
            "config": { "url": "postgres://db/sales", "password": "hunter2" }
        }))
        .unwrap();
        assert_eq!(create.source_type, "JDBC");
    }

    #[test]
    fn test_view_hides_password() {
        let config = SourceConfig {
            url: "mysql://db/sales".to_string(),
            user: Some("reader".to_string()),
            password: Some("encrypted".to_string()),
            db_type: None,
            server_paging: false,
        };
        let json = serde_json::to_value(SourceConfigView::from(&config)).unwrap();
        assert_eq!(json["has_password"], true);
        assert!(json.get("password").is_none());
        assert!(!json.to_string().contains("encrypted"));
    }
}
