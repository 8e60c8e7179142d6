//! Pluggable SQL data providers.
//!
//! A data source is described by a [`SourceConfig`] holding an sqlx connection URL and optional
//! credentials. The [`Dialect`] is chosen from the explicit `db_type` or from the URL scheme, and a
//! [`SqlAdapter`] owns the connection pool for one source. It answers metadata lookups
//! (databases, tables, columns) and runs scripts, mapping results into a [`Dataframe`].
//!
//! [`DataProviderManager`] keeps one adapter per source id so pools are shared between requests.
//! Updating or deleting a source must go through [`DataProviderManager::evict`] so the stale pool
//! is closed.

mod adapter;
mod dataframe;
mod dialect;

pub use adapter::SqlAdapter;
pub use dataframe::{Column, DataType, Dataframe, PageInfo};
pub use dialect::Dialect;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnectOptions;
use thiserror::Error;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::config::DataProviderConfig;
use crate::types::{SourceId, abbrev_uuid};

/// The only provider type in this build: SQL databases reached through sqlx drivers.
pub const JDBC_PROVIDER_TYPE: &str = "JDBC";

#[derive(Error, Debug)]
pub enum DataProviderError {
    /// Database type could not be mapped to a dialect
    #[error("Dbtype {db_type} mismatched")]
    DialectMismatch { db_type: String },

    /// Could not open a connection to the source
    #[error("Failed to connect to data source: {message}")]
    Connection { message: String },

    /// The source rejected the statement
    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Script is empty")]
    EmptyScript,

    /// Scripts must be exactly one query that returns rows
    #[error("Unsupported statement: {message}")]
    UnsupportedStatement { message: String },

    #[error("Invalid source configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Query timed out after {}", humantime::format_duration(*.after))]
    Timeout { after: Duration },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DataProviderError {
    /// Classify an sqlx error raised while talking to a source.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => DataProviderError::InvalidConfig { message: e.to_string() },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                DataProviderError::Connection { message: err.to_string() }
            }
            sqlx::Error::Database(db_err) => DataProviderError::Query {
                message: db_err.message().to_string(),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::ColumnIndexOutOfBounds { .. } => {
                DataProviderError::Query { message: err.to_string() }
            }
            other => DataProviderError::Other(anyhow::Error::from(other)),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataProviderError>;

fn default_server_paging() -> bool {
    true
}

/// Connection settings for one source, stored as the source's JSON config.
#[derive(Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SourceConfig {
    /// sqlx connection URL, e.g. `postgres://host:5432/sales`
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Overrides the dialect inferred from the URL scheme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
    /// Page through LIMIT/OFFSET instead of scrolling the full result
    #[serde(default = "default_server_paging")]
    pub server_paging: bool,
}

impl SourceConfig {
    /// Whether this is a SQLite source on the same file as the SQLite database at `database_url`.
    pub fn shares_file_with(&self, database_url: &str) -> bool {
        if !matches!(Dialect::resolve(self), Ok(Dialect::Sqlite)) {
            return false;
        }

        let file = |url: &str| {
            SqliteConnectOptions::from_str(url).ok().map(|options| {
                let path = options.get_filename().to_path_buf();
                std::fs::canonicalize(&path).unwrap_or(path)
            })
        };
        match (file(&self.url), file(database_url)) {
            (Some(source), Some(metadata)) => source == metadata,
            _ => false,
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db_type", &self.db_type)
            .field("server_paging", &self.server_paging)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderInfo {
    #[serde(rename = "type")]
    pub provider_type: String,
    pub dialects: Vec<Dialect>,
}

/// Caches one [`SqlAdapter`] per source.
#[derive(Clone)]
pub struct DataProviderManager {
    adapters: Arc<DashMap<SourceId, Arc<SqlAdapter>>>,
    settings: DataProviderConfig,
}

impl DataProviderManager {
    pub fn new(settings: DataProviderConfig) -> Self {
        Self {
            adapters: Arc::new(DashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &DataProviderConfig {
        &self.settings
    }

    /// Return the cached adapter for `source_id`, creating it from `config` on first use.
    ///
    /// A cached adapter built from different settings is replaced, so an adapter cached from a
    /// config read just before an update cannot outlive the next lookup. In-flight users of the
    /// replaced adapter keep it until they finish.
    #[instrument(skip(self, config), fields(source_id = %abbrev_uuid(&source_id)), err)]
    pub fn adapter(&self, source_id: SourceId, config: &SourceConfig) -> Result<Arc<SqlAdapter>> {
        let mut entry = self
            .adapters
            .entry(source_id)
            .or_try_insert_with(|| SqlAdapter::init(config.clone(), &self.settings).map(Arc::new))?;
        if entry.config() != config {
            debug!("Cached data source pool is stale, rebuilding");
            *entry = Arc::new(SqlAdapter::init(config.clone(), &self.settings)?);
        }
        Ok(Arc::clone(entry.value()))
    }

    /// Drop and close the cached adapter for a source that changed or went away.
    #[instrument(skip(self), fields(source_id = %abbrev_uuid(&source_id)))]
    pub async fn evict(&self, source_id: SourceId) {
        if let Some((_, adapter)) = self.adapters.remove(&source_id) {
            debug!("Closing cached data source pool");
            adapter.close().await;
        }
    }

    /// Try a throwaway connection with ad-hoc settings.
    pub async fn test_connection(&self, config: &SourceConfig) -> Result<bool> {
        SqlAdapter::test(config, self.settings.query_timeout).await
    }

    pub fn supported_providers(&self) -> Vec<ProviderInfo> {
        vec![ProviderInfo {
            provider_type: JDBC_PROVIDER_TYPE.to_string(),
            dialects: Dialect::ALL.to_vec(),
        }]
    }

    pub fn cached_count(&self) -> usize {
        self.adapters.len()
    }

    pub async fn close_all(&self) {
        let ids: Vec<SourceId> = self.adapters.iter().map(|entry| *entry.key()).collect();
        info!("Closing {} data source pools", ids.len());
        for id in ids {
            self.evict(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sqlite_config(path: &std::path::Path) -> SourceConfig {
        SourceConfig {
            url: format!("sqlite://{}", path.display()),
            user: None,
            password: None,
            db_type: None,
            server_paging: true,
        }
    }

    #[test]
    fn test_source_config_defaults_and_masking() {
        let config: SourceConfig = serde_json::from_value(serde_json::json!({
            "url": "postgres://localhost/sales",
            "password": "hunter2"
        }))
        .unwrap();

        assert!(config.server_paging);
        assert!(config.db_type.is_none());
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_supported_providers_lists_all_dialects() {
        let manager = DataProviderManager::new(DataProviderConfig::default());
        let providers = manager.supported_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].provider_type, "JDBC");
        assert_eq!(providers[0].dialects, Dialect::ALL.to_vec());
    }

    #[test]
    fn test_sqlx_error_classification() {
        assert!(matches!(
            DataProviderError::from_sqlx(sqlx::Error::PoolTimedOut),
            DataProviderError::Connection { .. }
        ));
        assert!(matches!(
            DataProviderError::from_sqlx(sqlx::Error::ColumnNotFound("x".into())),
            DataProviderError::Query { .. }
        ));
    }

    #[test]
    fn test_timeout_message() {
        let err = DataProviderError::Timeout {
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "Query timed out after 5s");
    }

    #[tokio::test]
    async fn test_adapter_is_cached_until_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        std::fs::File::create(&path).unwrap();

        let manager = DataProviderManager::new(DataProviderConfig::default());
        let id = Uuid::new_v4();
        let config = sqlite_config(&path);

        let first = manager.adapter(id, &config).unwrap();
        let second = manager.adapter(id, &config).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(manager.cached_count(), 1);

        manager.evict(id).await;
        assert_eq!(manager.cached_count(), 0);

        let third = manager.adapter(id, &config).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));

        manager.close_all().await;
        assert_eq!(manager.cached_count(), 0);
    }

    #[tokio::test]
    async fn test_adapter_init_rejects_unknown_dialect() {
        let manager = DataProviderManager::new(DataProviderConfig::default());
        let config = SourceConfig {
            url: "oracle://localhost/db".to_string(),
            user: None,
            password: None,
            db_type: None,
            server_paging: true,
        };

        let err = manager.adapter(Uuid::new_v4(), &config).unwrap_err();
        assert!(matches!(err, DataProviderError::DialectMismatch { .. }));
        assert_eq!(manager.cached_count(), 0);
    }

    #[tokio::test]
    async fn test_adapter_rebuilt_when_config_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (old_path, new_path) = (dir.path().join("old.db"), dir.path().join("new.db"));
        std::fs::File::create(&old_path).unwrap();
        std::fs::File::create(&new_path).unwrap();

        let manager = DataProviderManager::new(DataProviderConfig::default());
        let id = Uuid::new_v4();
        let (old, new) = (sqlite_config(&old_path), sqlite_config(&new_path));

        let first = manager.adapter(id, &old).unwrap();
        let rebuilt = manager.adapter(id, &new).unwrap();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert_eq!(rebuilt.config(), &new);

        let again = manager.adapter(id, &new).unwrap();
        assert!(Arc::ptr_eq(&rebuilt, &again));
        assert_eq!(manager.cached_count(), 1);
    }

    #[test]
    fn test_shares_file_with_metadata_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vizboard.db");
        std::fs::File::create(&path).unwrap();
        let metadata_url = format!("sqlite://{}", path.display());

        assert!(sqlite_config(&path).shares_file_with(&metadata_url));

        // Same file through a different spelling of the path
        let dotted = dir.path().join(".").join("vizboard.db");
        assert!(sqlite_config(&dotted).shares_file_with(&metadata_url));

        assert!(!sqlite_config(&dir.path().join("other.db")).shares_file_with(&metadata_url));
        let postgres = SourceConfig {
            url: "postgres://localhost/vizboard".to_string(),
            user: None,
            password: None,
            db_type: None,
            server_paging: true,
        };
        assert!(!postgres.shares_file_with(&metadata_url));
    }
}
