//! Data provider handlers: connection tests, metadata browsing and script execution.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState,
    api::{
        handlers::sources::{ensure_not_metadata_store, load_source},
        models::{data_provider::ExecuteRequest, response::ResponseData, users::CurrentUser},
    },
    auth::{permissions::require_org_member, session::secret_key},
    crypto::decrypt_secret,
    errors::{Error, Result},
    provider::{Column, Dataframe, ProviderInfo, SourceConfig, SqlAdapter},
    types::{Operation, Resource, SourceId, abbrev_uuid},
};

/// Resolve the cached adapter for a source the caller can read.
async fn source_adapter(state: &AppState, current_user: &CurrentUser, source_id: SourceId) -> Result<Arc<SqlAdapter>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let source = load_source(&mut conn, source_id).await?;
    require_org_member(&mut conn, current_user, source.org_id, Operation::Read, Resource::Sources).await?;
    drop(conn);

    let mut config: SourceConfig = source.config.0;
    ensure_not_metadata_store(&state.config, &config)?;
    if let Some(sealed) = config.password.take() {
        config.password = Some(decrypt_secret(secret_key(&state.config)?, &sealed)?);
    }

    Ok(state.providers.adapter(source_id, &config)?)
}

/// List provider types and the dialects they speak
#[utoipa::path(
    get,
    path = "/data-provider/providers",
    tag = "data-provider",
    responses(
        (status = 200, description = "Supported providers", body = ResponseData<Vec<ProviderInfo>>),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_providers(State(state): State<AppState>, _current_user: CurrentUser) -> ResponseData<Vec<ProviderInfo>> {
    ResponseData::success(state.providers.supported_providers())
}

/// Try to connect with ad-hoc settings
#[utoipa::path(
    post,
    path = "/data-provider/test",
    request_body = SourceConfig,
    tag = "data-provider",
    responses(
        (status = 200, description = "Connection succeeded", body = ResponseData<bool>),
        (status = 400, description = "Invalid settings or connection refused"),
        (status = 504, description = "Connection timed out"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn test_connection(
    State(state): State<AppState>,
    _current_user: CurrentUser,
    Json(config): Json<SourceConfig>,
) -> Result<ResponseData<bool>> {
    ensure_not_metadata_store(&state.config, &config)?;
    let ok = state.providers.test_connection(&config).await?;
    Ok(ResponseData::success(ok))
}

/// List the databases (schemas) visible through a source
#[utoipa::path(
    get,
    path = "/data-provider/{source_id}/databases",
    tag = "data-provider",
    params(("source_id" = uuid::Uuid, Path, description = "Source ID")),
    responses(
        (status = 200, description = "Database names", body = ResponseData<Vec<String>>),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Source not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(source_id = %abbrev_uuid(&source_id)))]
pub async fn list_databases(
    State(state): State<AppState>,
    Path(source_id): Path<SourceId>,
    current_user: CurrentUser,
) -> Result<ResponseData<Vec<String>>> {
    let adapter = source_adapter(&state, &current_user, source_id).await?;
    let databases = adapter.read_all_databases().await?;
    Ok(ResponseData::success(databases.into_iter().collect()))
}

/// List the tables and views of a database
#[utoipa::path(
    get,
    path = "/data-provider/{source_id}/{database}/tables",
    tag = "data-provider",
    params(
        ("source_id" = uuid::Uuid, Path, description = "Source ID"),
        ("database" = String, Path, description = "Database or schema name"),
    ),
    responses(
        (status = 200, description = "Table names", body = ResponseData<Vec<String>>),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Source not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(source_id = %abbrev_uuid(&source_id), database = %database))]
pub async fn list_tables(
    State(state): State<AppState>,
    Path((source_id, database)): Path<(SourceId, String)>,
    current_user: CurrentUser,
) -> Result<ResponseData<Vec<String>>> {
    let adapter = source_adapter(&state, &current_user, source_id).await?;
    let tables = adapter.read_all_tables(&database).await?;
    Ok(ResponseData::success(tables.into_iter().collect()))
}

/// Describe the columns of a table
#[utoipa::path(
    get,
    path = "/data-provider/{source_id}/{database}/{table}/columns",
    tag = "data-provider",
    params(
        ("source_id" = uuid::Uuid, Path, description = "Source ID"),
        ("database" = String, Path, description = "Database or schema name"),
        ("table" = String, Path, description = "Table or view name"),
    ),
    responses(
        (status = 200, description = "Columns in table order", body = ResponseData<Vec<Column>>),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Source not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(source_id = %abbrev_uuid(&source_id), database = %database, table = %table))]
pub async fn list_columns(
    State(state): State<AppState>,
    Path((source_id, database, table)): Path<(SourceId, String, String)>,
    current_user: CurrentUser,
) -> Result<ResponseData<Vec<Column>>> {
    let adapter = source_adapter(&state, &current_user, source_id).await?;
    let columns = adapter.read_table_columns(&database, &table).await?;
    Ok(ResponseData::success(columns))
}

/// Run a script against a source
#[utoipa::path(
    post,
    path = "/data-provider/execute",
    request_body = ExecuteRequest,
    tag = "data-provider",
    responses(
        (status = 200, description = "Query result", body = ResponseData<Dataframe>),
        (status = 400, description = "Empty script, unknown variable or query error"),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Source not found"),
        (status = 504, description = "Query timed out"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(source_id = %abbrev_uuid(&request.source_id), paged = request.page_info.is_some()))]
pub async fn execute(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<ExecuteRequest>,
) -> Result<ResponseData<Dataframe>> {
    let adapter = source_adapter(&state, &current_user, request.source_id).await?;
    let script = adapter.dialect().render_script(&request.script, &request.variables)?;

    let frame = match request.page_info {
        Some(page_info) => {
            let settings = state.providers.settings();
            let page_info = page_info.clamped(settings.default_page_size, settings.max_page_size);
            adapter.execute_paged(&script, page_info).await?
        }
        None => adapter.execute(&script).await?,
    };

    Ok(ResponseData::success(frame))
}
