//! Connection pool and query execution for one data source.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::TryStreamExt;
use futures::stream::BoxStream;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::Value;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlRow};
use sqlx::pool::PoolOptions;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{ColumnIndex, Connection, Decode, Executor, Row, Statement as _, Type, TypeInfo as _};
use tracing::{debug, info, instrument, trace};

use super::{Column, DataProviderError, DataType, Dataframe, Dialect, PageInfo, Result, SourceConfig};
use crate::config::{DataProviderConfig, PoolSettings};

#[derive(Debug)]
enum SourcePool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Owns the connection pool of one source and runs metadata lookups and scripts against it.
#[derive(Debug)]
pub struct SqlAdapter {
    dialect: Dialect,
    config: SourceConfig,
    pool: SourcePool,
    max_rows: usize,
    query_timeout: Duration,
}

fn pool_options<DB: sqlx::Database>(settings: &PoolSettings) -> PoolOptions<DB> {
    PoolOptions::<DB>::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
}

// Every session of a source is read-only, whatever the script tries.
fn pg_options(config: &SourceConfig) -> Result<PgConnectOptions> {
    let mut options = PgConnectOptions::from_str(&config.url)
        .map_err(DataProviderError::from_sqlx)?
        .options([("default_transaction_read_only", "on")]);
    if let Some(user) = config.user.as_deref() {
        options = options.username(user);
    }
    if let Some(password) = config.password.as_deref() {
        options = options.password(password);
    }
    Ok(options)
}

fn mysql_options(config: &SourceConfig) -> Result<MySqlConnectOptions> {
    let mut options = MySqlConnectOptions::from_str(&config.url).map_err(DataProviderError::from_sqlx)?;
    if let Some(user) = config.user.as_deref() {
        options = options.username(user);
    }
    if let Some(password) = config.password.as_deref() {
        options = options.password(password);
    }
    Ok(options)
}

// SQLite has no credentials; the file must already exist.
fn sqlite_options(config: &SourceConfig) -> Result<SqliteConnectOptions> {
    Ok(SqliteConnectOptions::from_str(&config.url)
        .map_err(DataProviderError::from_sqlx)?
        .read_only(true))
}

fn mysql_pool(config: &SourceConfig, settings: &PoolSettings) -> Result<MySqlPool> {
    Ok(pool_options::<MySql>(settings)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                Ok(())
            })
        })
        .connect_lazy_with(mysql_options(config)?))
}

async fn bounded<T>(limit: Duration, work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, work)
        .await
        .map_err(|_| DataProviderError::Timeout { after: limit })?
}

impl SqlAdapter {
    /// Build the adapter and its pool. Connections are opened on first use.
    pub fn init(config: SourceConfig, settings: &DataProviderConfig) -> Result<Self> {
        let dialect = Dialect::resolve(&config)?;
        let pool = match dialect {
            Dialect::Postgresql => SourcePool::Postgres(pool_options(&settings.pool).connect_lazy_with(pg_options(&config)?)),
            Dialect::Mysql => SourcePool::MySql(mysql_pool(&config, &settings.pool)?),
            Dialect::Sqlite => SourcePool::Sqlite(pool_options(&settings.pool).connect_lazy_with(sqlite_options(&config)?)),
        };
        info!(%dialect, "Initialized data source pool");

        Ok(Self {
            dialect,
            config,
            pool,
            max_rows: settings.max_rows,
            query_timeout: settings.query_timeout,
        })
    }

    /// Open a single connection with the given settings and close it again.
    #[instrument(skip(config), err)]
    pub async fn test(config: &SourceConfig, timeout: Duration) -> Result<bool> {
        let dialect = Dialect::resolve(config)?;
        let refused = |e: sqlx::Error| DataProviderError::Connection { message: e.to_string() };

        bounded(timeout, async {
            match dialect {
                Dialect::Postgresql => {
                    let conn = PgConnection::connect_with(&pg_options(config)?).await.map_err(refused)?;
                    conn.close().await.map_err(refused)?;
                }
                Dialect::Mysql => {
                    let conn = MySqlConnection::connect_with(&mysql_options(config)?).await.map_err(refused)?;
                    conn.close().await.map_err(refused)?;
                }
                Dialect::Sqlite => {
                    let conn = SqliteConnection::connect_with(&sqlite_options(config)?).await.map_err(refused)?;
                    conn.close().await.map_err(refused)?;
                }
            }
            Ok(true)
        })
        .await
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn supports_paging(&self) -> bool {
        self.config.server_paging && self.dialect.supports_paging()
    }

    /// The current catalog if the connection has one, otherwise every catalog the server exposes.
    #[instrument(skip(self), fields(dialect = %self.dialect), err)]
    pub async fn read_all_databases(&self) -> Result<BTreeSet<String>> {
        bounded(self.query_timeout, async {
            if let Some(current) = self.current_catalog().await?.filter(|c| !c.trim().is_empty()) {
                return Ok(BTreeSet::from([current]));
            }

            let catalogs: Vec<String> = match &self.pool {
                SourcePool::Postgres(pool) => {
                    sqlx::query_scalar("SELECT datname::text FROM pg_database WHERE NOT datistemplate")
                        .fetch_all(pool)
                        .await
                }
                SourcePool::MySql(pool) => {
                    sqlx::query_scalar("SELECT CAST(schema_name AS CHAR) FROM information_schema.schemata")
                        .fetch_all(pool)
                        .await
                }
                SourcePool::Sqlite(pool) => sqlx::query_scalar("SELECT name FROM pragma_database_list").fetch_all(pool).await,
            }
            .map_err(DataProviderError::from_sqlx)?;

            Ok(catalogs.into_iter().collect())
        })
        .await
    }

    async fn current_catalog(&self) -> Result<Option<String>> {
        let current = match &self.pool {
            SourcePool::Postgres(pool) => sqlx::query_scalar("SELECT current_database()::text").fetch_one(pool).await,
            SourcePool::MySql(pool) => sqlx::query_scalar("SELECT CAST(DATABASE() AS CHAR)").fetch_one(pool).await,
            // Attached databases are all equal peers
            SourcePool::Sqlite(_) => Ok(None),
        };
        current.map_err(DataProviderError::from_sqlx)
    }

    /// Tables and views of `database`, restricted to the current schema where the dialect has one.
    #[instrument(skip(self), fields(dialect = %self.dialect), err)]
    pub async fn read_all_tables(&self, database: &str) -> Result<BTreeSet<String>> {
        bounded(self.query_timeout, async {
            let tables: Vec<String> = match &self.pool {
                SourcePool::Postgres(pool) => {
                    let sql = format!(
                        "SELECT table_name::text FROM information_schema.tables \
                         WHERE table_catalog = {} AND table_schema = current_schema()",
                        self.dialect.placeholder(1)
                    );
                    sqlx::query_scalar(&sql).bind(database).fetch_all(pool).await
                }
                SourcePool::MySql(pool) => {
                    let sql = format!(
                        "SELECT CAST(table_name AS CHAR) FROM information_schema.tables WHERE table_schema = {}",
                        self.dialect.placeholder(1)
                    );
                    sqlx::query_scalar(&sql).bind(database).fetch_all(pool).await
                }
                SourcePool::Sqlite(pool) => {
                    let sql = format!(
                        "SELECT name FROM {}.sqlite_master WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'",
                        self.dialect.quote_identifier(database)
                    );
                    sqlx::query_scalar(&sql).fetch_all(pool).await
                }
            }
            .map_err(DataProviderError::from_sqlx)?;

            Ok(tables.into_iter().collect())
        })
        .await
    }

    /// Columns of a table in ordinal order, de-duplicated by name.
    ///
    /// A name reported twice keeps its first position and takes the type of its last report.
    #[instrument(skip(self), fields(dialect = %self.dialect), err)]
    pub async fn read_table_columns(&self, database: &str, table: &str) -> Result<Vec<Column>> {
        bounded(self.query_timeout, async {
            let (p1, p2) = (self.dialect.placeholder(1), self.dialect.placeholder(2));
            let described: Vec<(String, String)> = match &self.pool {
                SourcePool::Postgres(pool) => {
                    let sql = format!(
                        "SELECT column_name::text, data_type::text FROM information_schema.columns \
                         WHERE table_catalog = {p1} AND table_schema = current_schema() AND table_name = {p2} \
                         ORDER BY ordinal_position"
                    );
                    sqlx::query_as(&sql).bind(database).bind(table).fetch_all(pool).await
                }
                SourcePool::MySql(pool) => {
                    let sql = format!(
                        "SELECT CAST(column_name AS CHAR), CAST(data_type AS CHAR) FROM information_schema.columns \
                         WHERE table_schema = {p1} AND table_name = {p2} ORDER BY ordinal_position"
                    );
                    sqlx::query_as(&sql).bind(database).bind(table).fetch_all(pool).await
                }
                SourcePool::Sqlite(pool) => {
                    let sql = format!("SELECT name, type FROM pragma_table_info({p2}, {p1}) ORDER BY cid");
                    sqlx::query_as(&sql).bind(database).bind(table).fetch_all(pool).await
                }
            }
            .map_err(DataProviderError::from_sqlx)?;

            Ok(dedup_columns(described))
        })
        .await
    }

    /// Run a script and map its result, capped at the configured row limit.
    #[instrument(skip(self, script), fields(dialect = %self.dialect), err)]
    pub async fn execute(&self, script: &str) -> Result<Dataframe> {
        let sql = self.dialect.render_script(script, &HashMap::new())?;
        bounded(self.query_timeout, async {
            let (columns, rows) = self.fetch_rows(&sql, 0, self.max_rows).await?;
            debug!(rows = rows.len(), "Query executed");
            Ok(Dataframe::new(columns, rows).with_script(sql.as_str()))
        })
        .await
    }

    /// Run a script and return one page of it.
    ///
    /// The total is (re)computed when `page_no <= 1` or when the caller does not know it yet;
    /// a first-page request is normalised to `page_no = 1`.
    #[instrument(skip(self, script), fields(dialect = %self.dialect, page_no = page_info.page_no, page_size = page_info.page_size), err)]
    pub async fn execute_paged(&self, script: &str, mut page_info: PageInfo) -> Result<Dataframe> {
        let sql = self.dialect.render_script(script, &HashMap::new())?;
        let take = usize::try_from(page_info.page_size).unwrap_or(0);

        bounded(self.query_timeout, async {
            if page_info.page_no <= 1 || page_info.total <= 0 {
                page_info.total = self.count_rows(&sql).await?;
                if page_info.page_no <= 1 {
                    page_info.page_no = 1;
                }
            }

            let (columns, rows) = if self.supports_paging() {
                let paged = self.dialect.wrap_paging(&sql, &page_info);
                self.fetch_rows(&paged, 0, take).await?
            } else {
                let skip = page_info.total.min(page_info.offset()).max(0);
                self.fetch_rows(&sql, usize::try_from(skip).unwrap_or(0), take).await?
            };

            Ok(Dataframe::new(columns, rows)
                .with_page_info(page_info)
                .with_script(sql.as_str()))
        })
        .await
    }

    pub async fn close(&self) {
        match &self.pool {
            SourcePool::Postgres(pool) => pool.close().await,
            SourcePool::MySql(pool) => pool.close().await,
            SourcePool::Sqlite(pool) => pool.close().await,
        }
    }

    async fn count_rows(&self, sql: &str) -> Result<i64> {
        if !self.supports_paging() {
            return self.count_by_scrolling(sql).await;
        }

        let count_sql = self.dialect.wrap_count(sql);
        let total = match &self.pool {
            SourcePool::Postgres(pool) => sqlx::query(&count_sql).persistent(false).fetch_one(pool).await.and_then(|r| r.try_get::<i64, _>(0)),
            SourcePool::MySql(pool) => sqlx::query(&count_sql).persistent(false).fetch_one(pool).await.and_then(|r| r.try_get::<i64, _>(0)),
            SourcePool::Sqlite(pool) => sqlx::query(&count_sql).persistent(false).fetch_one(pool).await.and_then(|r| r.try_get::<i64, _>(0)),
        };
        total.map_err(DataProviderError::from_sqlx)
    }

    async fn count_by_scrolling(&self, sql: &str) -> Result<i64> {
        let total = match &self.pool {
            SourcePool::Postgres(pool) => sqlx::query(sql).persistent(false).fetch(pool).try_fold(0i64, |n, _| async move { Ok(n + 1) }).await,
            SourcePool::MySql(pool) => sqlx::query(sql).persistent(false).fetch(pool).try_fold(0i64, |n, _| async move { Ok(n + 1) }).await,
            SourcePool::Sqlite(pool) => sqlx::query(sql).persistent(false).fetch(pool).try_fold(0i64, |n, _| async move { Ok(n + 1) }).await,
        };
        total.map_err(DataProviderError::from_sqlx)
    }

    /// Run `sql` as one prepared statement on a read-only session.
    async fn fetch_rows(&self, sql: &str, skip: usize, take: usize) -> Result<(Vec<Column>, Vec<Vec<Value>>)> {
        let (columns, rows) = match &self.pool {
            SourcePool::Postgres(pool) => collect_rows(sqlx::query(sql).persistent(false).fetch(pool), skip, take).await,
            SourcePool::MySql(pool) => collect_rows(sqlx::query(sql).persistent(false).fetch(pool), skip, take).await,
            SourcePool::Sqlite(pool) => collect_rows(sqlx::query(sql).persistent(false).fetch(pool), skip, take).await,
        }
        .map_err(DataProviderError::from_sqlx)?;

        let columns = match columns {
            Some(columns) => columns,
            None => self.describe_columns(sql).await,
        };
        Ok((columns, rows))
    }

    /// Result columns of a statement that produced no rows.
    async fn describe_columns(&self, sql: &str) -> Vec<Column> {
        let described = match &self.pool {
            SourcePool::Postgres(pool) => pool.prepare(sql).await.map(|s| frame_columns(s.columns())),
            SourcePool::MySql(pool) => pool.prepare(sql).await.map(|s| frame_columns(s.columns())),
            SourcePool::Sqlite(pool) => pool.prepare(sql).await.map(|s| frame_columns(s.columns())),
        };
        described.unwrap_or_else(|e| {
            debug!("Could not describe result columns: {e}");
            Vec::new()
        })
    }
}

fn dedup_columns(described: Vec<(String, String)>) -> Vec<Column> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut columns: Vec<Column> = Vec::with_capacity(described.len());
    for (name, type_name) in described {
        let column = Column::new(name.clone(), DataType::from_sql_type(&type_name));
        match positions.get(&name) {
            Some(&index) => columns[index] = column,
            None => {
                positions.insert(name, columns.len());
                columns.push(column);
            }
        }
    }
    columns
}

fn frame_columns<C: sqlx::Column>(columns: &[C]) -> Vec<Column> {
    columns
        .iter()
        .map(|c| Column::new(c.name(), DataType::from_sql_type(c.type_info().name())))
        .collect()
}

async fn collect_rows<R: DecodeCell>(
    mut stream: BoxStream<'_, std::result::Result<R, sqlx::Error>>,
    skip: usize,
    take: usize,
) -> std::result::Result<(Option<Vec<Column>>, Vec<Vec<Value>>), sqlx::Error> {
    let mut columns = None;
    let mut rows = Vec::new();
    let mut seen = 0usize;

    while rows.len() < take {
        let Some(row) = stream.try_next().await? else {
            break;
        };
        if columns.is_none() {
            columns = Some(frame_columns(row.columns()));
        }
        seen += 1;
        if seen <= skip {
            continue;
        }
        rows.push((0..row.len()).map(|index| row.cell(index)).collect());
    }

    Ok((columns, rows))
}

/// Decodes one cell of a driver row into JSON by trying the driver's types in turn.
trait DecodeCell: Row {
    fn cell(&self, index: usize) -> Value;
}

fn decode_as<'r, R, T>(row: &'r R, index: usize) -> Option<Value>
where
    R: Row,
    T: Decode<'r, R::Database> + Type<R::Database> + Serialize,
    usize: ColumnIndex<R>,
{
    row.try_get::<Option<T>, _>(index)
        .ok()
        .map(|value| serde_json::to_value(value).unwrap_or(Value::Null))
}

fn decode_decimal<'r, R>(row: &'r R, index: usize) -> Option<Value>
where
    R: Row,
    Decimal: Decode<'r, R::Database> + Type<R::Database>,
    usize: ColumnIndex<R>,
{
    row.try_get::<Option<Decimal>, _>(index).ok().map(|value| match value {
        Some(d) => d
            .to_f64()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(d.to_string())),
        None => Value::Null,
    })
}

fn decode_bytes<'r, R>(row: &'r R, index: usize) -> Option<Value>
where
    R: Row,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
    usize: ColumnIndex<R>,
{
    row.try_get::<Option<Vec<u8>>, _>(index)
        .ok()
        .map(|value| value.map_or(Value::Null, |bytes| Value::String(STANDARD.encode(bytes))))
}

fn undecodable(index: usize) -> Value {
    trace!(index, "Unsupported column type, returning null");
    Value::Null
}

impl DecodeCell for PgRow {
    fn cell(&self, index: usize) -> Value {
        decode_as::<_, bool>(self, index)
            .or_else(|| decode_as::<_, i16>(self, index))
            .or_else(|| decode_as::<_, i32>(self, index))
            .or_else(|| decode_as::<_, i64>(self, index))
            .or_else(|| decode_as::<_, f32>(self, index))
            .or_else(|| decode_as::<_, f64>(self, index))
            .or_else(|| decode_decimal(self, index))
            .or_else(|| decode_as::<_, String>(self, index))
            .or_else(|| decode_as::<_, uuid::Uuid>(self, index))
            .or_else(|| decode_as::<_, chrono::DateTime<chrono::Utc>>(self, index))
            .or_else(|| decode_as::<_, chrono::NaiveDateTime>(self, index))
            .or_else(|| decode_as::<_, chrono::NaiveDate>(self, index))
            .or_else(|| decode_as::<_, chrono::NaiveTime>(self, index))
            .or_else(|| decode_as::<_, Value>(self, index))
            .or_else(|| decode_bytes(self, index))
            .unwrap_or_else(|| undecodable(index))
    }
}

impl DecodeCell for MySqlRow {
    fn cell(&self, index: usize) -> Value {
        decode_as::<_, i64>(self, index)
            .or_else(|| decode_as::<_, u64>(self, index))
            .or_else(|| decode_as::<_, f32>(self, index))
            .or_else(|| decode_as::<_, f64>(self, index))
            .or_else(|| decode_decimal(self, index))
            .or_else(|| decode_as::<_, String>(self, index))
            .or_else(|| decode_as::<_, chrono::DateTime<chrono::Utc>>(self, index))
            .or_else(|| decode_as::<_, chrono::NaiveDateTime>(self, index))
            .or_else(|| decode_as::<_, chrono::NaiveDate>(self, index))
            .or_else(|| decode_as::<_, chrono::NaiveTime>(self, index))
            .or_else(|| decode_as::<_, Value>(self, index))
            .or_else(|| decode_bytes(self, index))
            .unwrap_or_else(|| undecodable(index))
    }
}

impl DecodeCell for SqliteRow {
    fn cell(&self, index: usize) -> Value {
        decode_as::<_, i64>(self, index)
            .or_else(|| decode_as::<_, f64>(self, index))
            .or_else(|| decode_as::<_, String>(self, index))
            .or_else(|| decode_bytes(self, index))
            .unwrap_or_else(|| undecodable(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_sample_source_db;

    fn settings() -> DataProviderConfig {
        DataProviderConfig {
            max_rows: 20,
            ..DataProviderConfig::default()
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_connection_succeeds_for_existing_file() {
        let (_dir, config) = create_sample_source_db().await;
        assert!(SqlAdapter::test(&config, Duration::from_secs(5)).await.unwrap());
    }

    #[test_log::test(tokio::test)]
    async fn test_connection_fails_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = SourceConfig {
            url: format!("sqlite://{}", dir.path().join("missing.db").display()),
            user: None,
            password: None,
            db_type: None,
            server_paging: true,
        };

        let err = SqlAdapter::test(&config, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, DataProviderError::Connection { .. }));
    }

    #[test_log::test(tokio::test)]
    async fn test_connection_rejects_malformed_url() {
        let config = SourceConfig {
            url: "postgres://user@host:notaport/db".to_string(),
            user: None,
            password: None,
            db_type: None,
            server_paging: true,
        };
        let err = SqlAdapter::test(&config, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, DataProviderError::InvalidConfig { .. }));
    }

    #[test_log::test(tokio::test)]
    async fn test_read_metadata() {
        let (_dir, config) = create_sample_source_db().await;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();

        let databases = adapter.read_all_databases().await.unwrap();
        assert!(databases.contains("main"));

        let tables = adapter.read_all_tables("main").await.unwrap();
        assert!(tables.contains("sales"));
        assert!(tables.contains("north_sales"));
        assert!(!tables.iter().any(|t| t.starts_with("sqlite_")));

        let columns = adapter.read_table_columns("main", "sales").await.unwrap();
        assert_eq!(
            columns,
            vec![
                Column::new("id", DataType::Numeric),
                Column::new("region", DataType::String),
                Column::new("amount", DataType::Numeric),
                Column::new("sold_at", DataType::Date),
                Column::new("active", DataType::Boolean),
            ]
        );

        assert!(adapter.read_table_columns("main", "no_such_table").await.unwrap().is_empty());
        adapter.close().await;
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_maps_rows_and_strips_semicolon() {
        let (_dir, config) = create_sample_source_db().await;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();

        let frame = adapter
            .execute("SELECT id, region, amount FROM sales WHERE id <= 2 ORDER BY id;")
            .await
            .unwrap();

        assert_eq!(frame.columns.len(), 3);
        assert_eq!(frame.columns[0].name, "id");
        assert_eq!(frame.columns[1].data_type, DataType::String);
        assert_eq!(frame.rows.len(), 2);
        assert_eq!(frame.rows[0], vec![Value::from(1), Value::from("north"), Value::from(10.5)]);
        assert_eq!(frame.script.as_deref(), Some("SELECT id, region, amount FROM sales WHERE id <= 2 ORDER BY id"));
        assert!(frame.page_info.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_caps_rows_and_maps_nulls() {
        let (_dir, config) = create_sample_source_db().await;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();

        let frame = adapter.execute("SELECT amount FROM sales ORDER BY id").await.unwrap();
        assert_eq!(frame.rows.len(), 20);

        let last = adapter.execute("SELECT amount FROM sales WHERE id = 25").await.unwrap();
        assert_eq!(last.rows, vec![vec![Value::Null]]);
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_without_rows_still_describes_columns() {
        let (_dir, config) = create_sample_source_db().await;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();

        let frame = adapter.execute("SELECT id, region FROM sales WHERE id < 0").await.unwrap();
        assert!(frame.rows.is_empty());
        let names: Vec<_> = frame.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "region"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_errors() {
        let (_dir, config) = create_sample_source_db().await;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();

        assert!(matches!(adapter.execute("  ;").await, Err(DataProviderError::EmptyScript)));
        assert!(matches!(
            adapter.execute("SELECT * FROM missing_table").await,
            Err(DataProviderError::Query { .. })
        ));
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_paged_server_side() {
        let (_dir, config) = create_sample_source_db().await;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();
        assert!(adapter.supports_paging());

        let first = adapter
            .execute_paged("SELECT id FROM sales ORDER BY id", PageInfo::new(0, 10))
            .await
            .unwrap();
        assert_eq!(first.page_info, Some(PageInfo { page_no: 1, page_size: 10, total: 25 }));
        assert_eq!(first.rows.len(), 10);
        assert_eq!(first.rows[0][0], Value::from(1));

        let third = adapter
            .execute_paged(
                "SELECT id FROM sales ORDER BY id",
                PageInfo {
                    page_no: 3,
                    page_size: 10,
                    total: 25,
                },
            )
            .await
            .unwrap();
        assert_eq!(third.rows.len(), 5);
        assert_eq!(third.rows[0][0], Value::from(21));
        assert_eq!(third.page_info.map(|p| p.page_no), Some(3));
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_paged_by_scrolling() {
        let (_dir, mut config) = create_sample_source_db().await;
        config.server_paging = false;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();
        assert!(!adapter.supports_paging());

        // Unknown total on a later page gets counted without resetting the page number
        let page = adapter
            .execute_paged("SELECT id FROM sales ORDER BY id", PageInfo::new(2, 10))
            .await
            .unwrap();
        assert_eq!(page.page_info, Some(PageInfo { page_no: 2, page_size: 10, total: 25 }));
        let ids: Vec<_> = page.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids.first(), Some(&Value::from(11)));
        assert_eq!(ids.len(), 10);

        // Skipping is bounded by the total
        let beyond = adapter
            .execute_paged(
                "SELECT id FROM sales ORDER BY id",
                PageInfo {
                    page_no: 9,
                    page_size: 10,
                    total: 25,
                },
            )
            .await
            .unwrap();
        assert!(beyond.rows.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_refuses_writes_and_keeps_data() {
        let (_dir, config) = create_sample_source_db().await;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();

        for script in ["DELETE FROM sales", "SELECT 1; DROP TABLE sales", "UPDATE sales SET amount = 0"] {
            assert!(
                matches!(adapter.execute(script).await, Err(DataProviderError::UnsupportedStatement { .. })),
                "{script}"
            );
        }

        // Gets past the statement check, the read-only connection still refuses it
        assert!(matches!(
            adapter.execute("WITH doomed AS (SELECT 1) DELETE FROM sales").await,
            Err(DataProviderError::Query { .. })
        ));

        let count = adapter.execute("SELECT COUNT(*) FROM sales").await.unwrap();
        assert_eq!(count.rows, vec![vec![Value::from(25)]]);
        let tables = adapter.read_all_tables("main").await.unwrap();
        assert!(tables.contains("sales"));
    }

    #[test_log::test(tokio::test)]
    async fn test_execute_paged_with_trailing_line_comment() {
        let (_dir, config) = create_sample_source_db().await;
        let adapter = SqlAdapter::init(config, &settings()).unwrap();

        let frame = adapter
            .execute_paged("SELECT id FROM sales ORDER BY id -- all of them", PageInfo::new(1, 10))
            .await
            .unwrap();
        assert_eq!(frame.page_info, Some(PageInfo { page_no: 1, page_size: 10, total: 25 }));
        assert_eq!(frame.rows.len(), 10);
    }

    #[test]
    fn test_dedup_columns_keeps_position_and_last_type() {
        let columns = dedup_columns(vec![
            ("id".to_string(), "INTEGER".to_string()),
            ("name".to_string(), "TEXT".to_string()),
            ("id".to_string(), "TEXT".to_string()),
        ]);
        assert_eq!(
            columns,
            vec![Column::new("id", DataType::String), Column::new("name", DataType::String)]
        );
    }
}
