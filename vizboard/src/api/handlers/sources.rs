//! Data source handlers.
//!
//! Source passwords are encrypted with `secret_key` before they reach the database and are never
//! returned. Any change to a source evicts its cached connection pool.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::SqliteConnection;

use crate::{
    AppState,
    api::{
        handlers::folders::entry_name,
        models::{
            folders::OrgQuery,
            response::ResponseData,
            sources::{SourceCreate, SourceResponse, SourceUpdate},
            users::CurrentUser,
        },
    },
    auth::{
        permissions::{require_org_member, require_org_owner},
        session::secret_key,
    },
    config::Config,
    crypto::encrypt_secret,
    db::{
        handlers::{Repository, Sources},
        models::sources::{SourceCreateDBRequest, SourceDBResponse, SourceFilter, SourceUpdateDBRequest},
    },
    errors::{Error, Result},
    provider::{Dialect, JDBC_PROVIDER_TYPE, SourceConfig},
    types::{Operation, Resource, SourceId, abbrev_uuid},
};

pub(crate) async fn load_source(conn: &mut SqliteConnection, id: SourceId) -> Result<SourceDBResponse> {
    Sources::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Source".to_string(),
        id: id.to_string(),
    })
}

/// Refuse sources that would expose the metadata store itself.
pub(crate) fn ensure_not_metadata_store(config: &Config, source: &SourceConfig) -> Result<()> {
    if source.shares_file_with(&config.database.url) {
        return Err(Error::BadRequest {
            message: "A source cannot point at the Vizboard database".to_string(),
        });
    }
    Ok(())
}

/// Check the config maps onto a dialect, then encrypt its password.
fn seal_config(config: &Config, mut source: SourceConfig) -> Result<SourceConfig> {
    Dialect::resolve(&source)?;
    ensure_not_metadata_store(config, &source)?;

    source.password = match source.password.filter(|p| !p.is_empty()) {
        Some(plain) => Some(encrypt_secret(secret_key(config)?, &plain)?),
        None => None,
    };
    Ok(source)
}

/// List the sources of an organization
#[utoipa::path(
    get,
    path = "/sources",
    tag = "sources",
    params(OrgQuery),
    responses(
        (status = 200, description = "Sources ordered by name", body = ResponseData<Vec<SourceResponse>>),
        (status = 403, description = "Not a member of the organization"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&query.org_id)))]
pub async fn list_sources(
    State(state): State<AppState>,
    Query(query): Query<OrgQuery>,
    current_user: CurrentUser,
) -> Result<ResponseData<Vec<SourceResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    require_org_member(&mut conn, &current_user, query.org_id, Operation::Read, Resource::Sources).await?;

    let sources = Sources::new(&mut conn)
        .list(&SourceFilter {
            org_id: query.org_id,
            skip: 0,
            limit: i64::MAX,
        })
        .await?;

    Ok(ResponseData::success(sources.into_iter().map(SourceResponse::from).collect()))
}

/// Register a data source
#[utoipa::path(
    post,
    path = "/sources",
    request_body = SourceCreate,
    tag = "sources",
    responses(
        (status = 201, description = "Source created", body = ResponseData<SourceResponse>),
        (status = 400, description = "Unsupported type or invalid connection settings"),
        (status = 403, description = "Not an owner of the organization"),
        (status = 409, description = "Name already used in the organization"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&request.org_id)))]
pub async fn create_source(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<SourceCreate>,
) -> Result<(StatusCode, ResponseData<SourceResponse>)> {
    let name = entry_name(&request.name)?;
    if request.source_type != JDBC_PROVIDER_TYPE {
        return Err(Error::BadRequest {
            message: format!("Unsupported source type: {}", request.source_type),
        });
    }
    let config = seal_config(&state.config, request.config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    require_org_owner(&mut conn, &current_user, request.org_id, Operation::Create, Resource::Sources).await?;

    let source = Sources::new(&mut conn)
        .create(&SourceCreateDBRequest {
            org_id: request.org_id,
            name,
            source_type: request.source_type,
            config,
            created_by: current_user.id,
        })
        .await?;

    tracing::info!(source_id = %abbrev_uuid(&source.id), "Source created");
    Ok((StatusCode::CREATED, ResponseData::success(SourceResponse::from(source))))
}

/// Get a data source
#[utoipa::path(
    get,
    path = "/sources/{id}",
    tag = "sources",
    params(("id" = uuid::Uuid, Path, description = "Source ID")),
    responses(
        (status = 200, description = "Source without its password", body = ResponseData<SourceResponse>),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Source not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(source_id = %abbrev_uuid(&id)))]
pub async fn get_source(
    State(state): State<AppState>,
    Path(id): Path<SourceId>,
    current_user: CurrentUser,
) -> Result<ResponseData<SourceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let source = load_source(&mut conn, id).await?;
    require_org_member(&mut conn, &current_user, source.org_id, Operation::Read, Resource::Sources).await?;

    Ok(ResponseData::success(SourceResponse::from(source)))
}

/// Update a data source
#[utoipa::path(
    put,
    path = "/sources/{id}",
    request_body = SourceUpdate,
    tag = "sources",
    params(("id" = uuid::Uuid, Path, description = "Source ID")),
    responses(
        (status = 200, description = "Source updated", body = ResponseData<SourceResponse>),
        (status = 400, description = "Invalid connection settings"),
        (status = 403, description = "Not an owner of the organization"),
        (status = 404, description = "Source not found"),
        (status = 409, description = "Name already used in the organization"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(source_id = %abbrev_uuid(&id)))]
pub async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<SourceId>,
    current_user: CurrentUser,
    Json(request): Json<SourceUpdate>,
) -> Result<ResponseData<SourceResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let existing = load_source(&mut conn, id).await?;
    require_org_owner(&mut conn, &current_user, existing.org_id, Operation::Update, Resource::Sources).await?;

    let name = request.name.as_deref().map(entry_name).transpose()?;
    let config = match request.config {
        Some(config) => {
            let mut sealed = seal_config(&state.config, config)?;
            // No new password means keep the stored one
            if sealed.password.is_none() {
                sealed.password = existing.config.0.password;
            }
            Some(sealed)
        }
        None => None,
    };

    // Evict on both sides of the write; lookups also rebuild adapters whose config is stale
    state.providers.evict(id).await;
    let source = Sources::new(&mut conn).update(id, &SourceUpdateDBRequest { name, config }).await?;
    state.providers.evict(id).await;

    Ok(ResponseData::success(SourceResponse::from(source)))
}

/// Delete a data source and close its connection pool
#[utoipa::path(
    delete,
    path = "/sources/{id}",
    tag = "sources",
    params(("id" = uuid::Uuid, Path, description = "Source ID")),
    responses(
        (status = 200, description = "Source deleted", body = ResponseData<bool>),
        (status = 403, description = "Not an owner of the organization"),
        (status = 404, description = "Source not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(source_id = %abbrev_uuid(&id)))]
pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<SourceId>,
    current_user: CurrentUser,
) -> Result<ResponseData<bool>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let source = load_source(&mut conn, id).await?;
    require_org_owner(&mut conn, &current_user, source.org_id, Operation::Delete, Resource::Sources).await?;

    let deleted = Sources::new(&mut conn).delete(id).await?;
    state.providers.evict(id).await;

    Ok(ResponseData::success(deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::organizations::MemberRole;
    use crate::crypto::decrypt_secret;
    use crate::test_utils::*;
    use axum_test::TestServer;
    use serde_json::json;
    use sqlx::{ConnectOptions, Connection, SqlitePool};
    use uuid::Uuid;

    fn warehouse(org_id: Uuid) -> serde_json::Value {
        json!({
            "org_id": org_id,
            "name": "warehouse",
            "config": {
                "url": "postgres://db.internal:5432/sales",
                "user": "reader",
                "password": "hunter2"
            }
        })
    }

    async fn stored_password(pool: &SqlitePool, id: SourceId) -> Option<String> {
        let mut conn = pool.acquire().await.unwrap();
        load_source(&mut conn, id).await.unwrap().config.0.password
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_encrypts_and_hides_password(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        let server = create_test_server(pool.clone()).await;
        let auth = auth_header(&owner);

        let response = server.post("/api/v1/sources").add_header(&auth.0, &auth.1).json(&warehouse(org.id)).await;
        response.assert_status(StatusCode::CREATED);
        assert!(!response.text().contains("hunter2"));

        let body: ResponseData<SourceResponse> = response.json();
        let source = body.data.unwrap();
        assert_eq!(source.source_type, "JDBC");
        assert!(source.config.has_password);

        let ciphertext = stored_password(&pool, source.id).await.unwrap();
        assert_ne!(ciphertext, "hunter2");
        let key = create_test_config().secret_key.unwrap();
        assert_eq!(decrypt_secret(&key, &ciphertext).unwrap(), "hunter2");

        server
            .post("/api/v1/sources")
            .add_header(&auth.0, &auth.1)
            .json(&warehouse(org.id))
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_rejects_bad_config(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&owner);

        let mut body = warehouse(org.id);
        body["config"]["url"] = json!("oracle://db.internal/sales");
        server
            .post("/api/v1/sources")
            .add_header(&auth.0, &auth.1)
            .json(&body)
            .await
            .assert_status_bad_request();

        let mut body = warehouse(org.id);
        body["type"] = json!("HTTP");
        server
            .post("/api/v1/sources")
            .add_header(&auth.0, &auth.1)
            .json(&body)
            .await
            .assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_members_read_owners_write(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let member = create_test_user(&pool, "member").await;
        let outsider = create_test_user(&pool, "outsider").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        add_test_member(&pool, org.id, member.id, MemberRole::Member).await;
        let server = create_test_server(pool).await;

        let member_auth = auth_header(&member);
        server
            .post("/api/v1/sources")
            .add_header(&member_auth.0, &member_auth.1)
            .json(&warehouse(org.id))
            .await
            .assert_status_forbidden();

        let owner_auth = auth_header(&owner);
        let response = server
            .post("/api/v1/sources")
            .add_header(&owner_auth.0, &owner_auth.1)
            .json(&warehouse(org.id))
            .await;
        let body: ResponseData<SourceResponse> = response.json();
        let id = body.data.unwrap().id;

        let response = server
            .get("/api/v1/sources")
            .add_query_param("org_id", org.id)
            .add_header(&member_auth.0, &member_auth.1)
            .await;
        response.assert_status_ok();
        let body: ResponseData<Vec<SourceResponse>> = response.json();
        assert_eq!(body.data.unwrap().len(), 1);

        server
            .delete(&format!("/api/v1/sources/{id}"))
            .add_header(&member_auth.0, &member_auth.1)
            .await
            .assert_status_forbidden();

        let outsider_auth = auth_header(&outsider);
        server
            .get(&format!("/api/v1/sources/{id}"))
            .add_header(&outsider_auth.0, &outsider_auth.1)
            .await
            .assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_keeps_password_unless_given(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        let server = create_test_server(pool.clone()).await;
        let auth = auth_header(&owner);
        let key = create_test_config().secret_key.unwrap();

        let response = server.post("/api/v1/sources").add_header(&auth.0, &auth.1).json(&warehouse(org.id)).await;
        let body: ResponseData<SourceResponse> = response.json();
        let id = body.data.unwrap().id;
        let original = stored_password(&pool, id).await.unwrap();

        let response = server
            .put(&format!("/api/v1/sources/{id}"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({
                "name": "warehouse-replica",
                "config": { "url": "postgres://replica.internal:5432/sales", "user": "reader" }
            }))
            .await;
        response.assert_status_ok();
        let body: ResponseData<SourceResponse> = response.json();
        let source = body.data.unwrap();
        assert_eq!(source.name, "warehouse-replica");
        assert_eq!(source.config.url, "postgres://replica.internal:5432/sales");
        assert_eq!(stored_password(&pool, id).await.unwrap(), original);

        server
            .put(&format!("/api/v1/sources/{id}"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "config": { "url": "postgres://replica.internal:5432/sales", "password": "rotated" } }))
            .await
            .assert_status_ok();
        let rotated = stored_password(&pool, id).await.unwrap();
        assert_eq!(decrypt_secret(&key, &rotated).unwrap(), "rotated");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_source(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&owner);

        let response = server.post("/api/v1/sources").add_header(&auth.0, &auth.1).json(&warehouse(org.id)).await;
        let body: ResponseData<SourceResponse> = response.json();
        let id = body.data.unwrap().id;

        let response = server.delete(&format!("/api/v1/sources/{id}")).add_header(&auth.0, &auth.1).await;
        response.assert_status_ok();
        let body: ResponseData<bool> = response.json();
        assert_eq!(body.data, Some(true));

        server
            .get(&format!("/api/v1/sources/{id}"))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_not_found();
        server
            .delete(&format!("/api/v1/sources/{}", Uuid::new_v4()))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refuses_metadata_database(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        let (dir, source) = create_sample_source_db().await;
        let mut config = create_test_config();
        config.database.url = source.url.clone();
        let server = create_test_server_with_config(pool, config).await;
        let auth = auth_header(&owner);

        // Same file spelled differently
        let url = format!("sqlite://{}", dir.path().join(".").join("sample.db").display());
        let response = server
            .post("/api/v1/sources")
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "org_id": org.id, "name": "meta", "config": { "url": url } }))
            .await;
        response.assert_status_bad_request();
        let body: ResponseData<SourceResponse> = response.json();
        assert!(body.message.unwrap_or_default().contains("Vizboard database"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_replaces_adapter_cached_by_stale_reader(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        let state = create_test_state(pool);
        let server = TestServer::new(crate::build_router(&state).unwrap()).unwrap();
        let auth = auth_header(&owner);

        let (_old_dir, old) = create_sample_source_db().await;
        let (new_dir, new) = create_sample_source_db().await;
        let mut conn = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(new_dir.path().join("sample.db"))
            .connect()
            .await
            .unwrap();
        sqlx::query("CREATE TABLE marker (id INTEGER)").execute(&mut conn).await.unwrap();
        conn.close().await.unwrap();

        let response = server
            .post("/api/v1/sources")
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "org_id": org.id, "name": "sample", "config": old }))
            .await;
        let body: ResponseData<SourceResponse> = response.json();
        let id = body.data.unwrap().id;

        server
            .put(&format!("/api/v1/sources/{id}"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "config": new }))
            .await
            .assert_status_ok();

        // A request that loaded the old row before the update repopulates the cache
        state.providers.adapter(id, &old).unwrap();

        server
            .post("/api/v1/data-provider/execute")
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "source_id": id, "script": "SELECT COUNT(*) FROM marker" }))
            .await
            .assert_status_ok();
    }
}
