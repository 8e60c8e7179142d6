//! Dashboard handlers.
//!
//! A live dashboard (ACTIVE or PUBLISHED) always has exactly one DASHBOARD entry in the folder
//! tree. Archiving removes the entry and restoring re-creates it, so archived dashboards only
//! show up in the archive listing.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::SqliteConnection;

use crate::{
    AppState,
    api::{
        handlers::folders::{check_name_free, check_parent, entry_name},
        models::{
            dashboards::{DashboardBaseInfo, DashboardCreate, DashboardDetail, DashboardUpdate, DeleteDashboardQuery, RestoreRequest, WidgetResponse},
            folders::{FolderResponse, OrgQuery},
            response::ResponseData,
            users::CurrentUser,
        },
    },
    auth::permissions::require_org_member,
    db::{
        handlers::{Dashboards, Folders, Repository, Widgets},
        models::{
            dashboards::{
                DashboardCreateDBRequest, DashboardDBResponse, DashboardFilter, DashboardStatus, DashboardUpdateDBRequest,
                WidgetCreateDBRequest, WidgetFilter, WidgetUpdateDBRequest,
            },
            folders::{FolderCreateDBRequest, FolderUpdateDBRequest, RelType},
        },
    },
    errors::{Error, Result},
    types::{DashboardId, Operation, Resource, UserId, WidgetId, abbrev_uuid},
};

fn widget_not_found(id: WidgetId) -> Error {
    Error::NotFound {
        resource: "Widget".to_string(),
        id: id.to_string(),
    }
}

fn archived(id: DashboardId) -> Error {
    Error::BadRequest {
        message: format!("Dashboard {id} is archived"),
    }
}

/// Load a dashboard and check the caller belongs to its organization.
async fn load_dashboard(
    conn: &mut SqliteConnection,
    current_user: &CurrentUser,
    id: DashboardId,
    action: Operation,
) -> Result<DashboardDBResponse> {
    let dashboard = Dashboards::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Dashboard".to_string(),
        id: id.to_string(),
    })?;
    require_org_member(conn, current_user, dashboard.org_id, action, Resource::Dashboards).await?;
    Ok(dashboard)
}

async fn set_status(conn: &mut SqliteConnection, id: DashboardId, status: DashboardStatus, user: UserId) -> Result<DashboardDBResponse> {
    Ok(Dashboards::new(conn)
        .update(id, &DashboardUpdateDBRequest::status(status, user))
        .await?)
}

async fn detail(conn: &mut SqliteConnection, dashboard: DashboardDBResponse) -> Result<DashboardDetail> {
    let widgets = Widgets::new(conn)
        .list(&WidgetFilter {
            dashboard_id: dashboard.id,
        })
        .await?;
    let folder = Folders::new(conn).get_by_rel(RelType::Dashboard, dashboard.id).await?;

    Ok(DashboardDetail::new(
        dashboard,
        widgets.into_iter().map(WidgetResponse::from).collect(),
        folder.map(FolderResponse::from),
    ))
}

async fn list_by_status(state: &AppState, current_user: &CurrentUser, query: &OrgQuery, statuses: Vec<DashboardStatus>) -> Result<Vec<DashboardBaseInfo>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    require_org_member(&mut conn, current_user, query.org_id, Operation::Read, Resource::Dashboards).await?;

    let dashboards = Dashboards::new(&mut conn)
        .list(&DashboardFilter {
            org_id: query.org_id,
            statuses,
            skip: 0,
            limit: i64::MAX,
        })
        .await?;

    Ok(dashboards.iter().map(DashboardBaseInfo::from).collect())
}

/// List the live (active and published) dashboards of an organization
#[utoipa::path(
    get,
    path = "/viz/dashboards",
    tag = "dashboards",
    params(OrgQuery),
    responses(
        (status = 200, description = "Dashboards, most recently updated first", body = ResponseData<Vec<DashboardBaseInfo>>),
        (status = 403, description = "Not a member of the organization"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&query.org_id)))]
pub async fn list_dashboards(
    State(state): State<AppState>,
    Query(query): Query<OrgQuery>,
    current_user: CurrentUser,
) -> Result<ResponseData<Vec<DashboardBaseInfo>>> {
    let dashboards = list_by_status(&state, &current_user, &query, vec![DashboardStatus::Active, DashboardStatus::Published]).await?;
    Ok(ResponseData::success(dashboards))
}

/// List the archived dashboards of an organization
#[utoipa::path(
    get,
    path = "/viz/dashboards/archived",
    tag = "dashboards",
    params(OrgQuery),
    responses(
        (status = 200, description = "Archived dashboards", body = ResponseData<Vec<DashboardBaseInfo>>),
        (status = 403, description = "Not a member of the organization"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&query.org_id)))]
pub async fn list_archived_dashboards(
    State(state): State<AppState>,
    Query(query): Query<OrgQuery>,
    current_user: CurrentUser,
) -> Result<ResponseData<Vec<DashboardBaseInfo>>> {
    let dashboards = list_by_status(&state, &current_user, &query, vec![DashboardStatus::Archived]).await?;
    Ok(ResponseData::success(dashboards))
}

/// Create a dashboard and its entry in the folder tree
#[utoipa::path(
    post,
    path = "/viz/dashboards",
    request_body = DashboardCreate,
    tag = "dashboards",
    responses(
        (status = 201, description = "Dashboard created. Returns its folder tree entry", body = ResponseData<FolderResponse>),
        (status = 400, description = "Blank name or invalid parent"),
        (status = 403, description = "Not a member of the organization"),
        (status = 409, description = "A sibling already has this name"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&request.org_id)))]
pub async fn create_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<DashboardCreate>,
) -> Result<(StatusCode, ResponseData<FolderResponse>)> {
    let name = entry_name(&request.name)?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    require_org_member(&mut tx, &current_user, request.org_id, Operation::Create, Resource::Dashboards).await?;
    check_parent(&mut tx, request.org_id, request.parent_id).await?;
    check_name_free(&mut tx, request.org_id, request.parent_id, &name, None).await?;

    let dashboard = Dashboards::new(&mut tx)
        .create(&DashboardCreateDBRequest {
            org_id: request.org_id,
            name: name.clone(),
            config: request.config,
            thumbnail: request.thumbnail,
            created_by: current_user.id,
        })
        .await?;

    let mut folders = Folders::new(&mut tx);
    let idx = match request.index {
        Some(index) => index,
        None => folders.next_index(request.org_id, request.parent_id).await?,
    };
    let folder = folders
        .create(&FolderCreateDBRequest {
            org_id: request.org_id,
            name,
            rel_type: RelType::Dashboard,
            rel_id: Some(dashboard.id),
            parent_id: request.parent_id,
            idx,
            created_by: current_user.id,
        })
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    tracing::info!(dashboard_id = %abbrev_uuid(&dashboard.id), "Dashboard created");

    Ok((StatusCode::CREATED, ResponseData::success(FolderResponse::from(folder))))
}

/// Get a dashboard with its config, widgets and folder entry
#[utoipa::path(
    get,
    path = "/viz/dashboards/{id}",
    tag = "dashboards",
    params(("id" = uuid::Uuid, Path, description = "Dashboard ID")),
    responses(
        (status = 200, description = "Dashboard detail", body = ResponseData<DashboardDetail>),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Dashboard not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(dashboard_id = %abbrev_uuid(&id)))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Path(id): Path<DashboardId>,
    current_user: CurrentUser,
) -> Result<ResponseData<DashboardDetail>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let dashboard = load_dashboard(&mut conn, &current_user, id, Operation::Read).await?;

    Ok(ResponseData::success(detail(&mut conn, dashboard).await?))
}

/// Update a dashboard and apply widget changes in one transaction
#[utoipa::path(
    put,
    path = "/viz/dashboards/{id}",
    request_body = DashboardUpdate,
    tag = "dashboards",
    params(("id" = uuid::Uuid, Path, description = "Dashboard ID")),
    responses(
        (status = 200, description = "Updated dashboard detail", body = ResponseData<DashboardDetail>),
        (status = 400, description = "Dashboard is archived or the name is blank"),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Dashboard or widget not found"),
        (status = 409, description = "A sibling already has this name"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(dashboard_id = %abbrev_uuid(&id)))]
pub async fn update_dashboard(
    State(state): State<AppState>,
    Path(id): Path<DashboardId>,
    current_user: CurrentUser,
    Json(request): Json<DashboardUpdate>,
) -> Result<ResponseData<DashboardDetail>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let dashboard = load_dashboard(&mut tx, &current_user, id, Operation::Update).await?;
    if dashboard.status == DashboardStatus::Archived {
        return Err(archived(id));
    }

    let name = request.name.as_deref().map(entry_name).transpose()?;
    if let Some(name) = name.as_deref().filter(|n| *n != dashboard.name) {
        let entry = Folders::new(&mut tx).get_by_rel(RelType::Dashboard, id).await?;
        if let Some(entry) = entry {
            check_name_free(&mut tx, dashboard.org_id, entry.parent_id, name, Some(entry.id)).await?;
            Folders::new(&mut tx)
                .update(
                    entry.id,
                    &FolderUpdateDBRequest {
                        name: Some(name.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
        }
    }

    let dashboard = Dashboards::new(&mut tx)
        .update(
            id,
            &DashboardUpdateDBRequest {
                name,
                config: request.config,
                thumbnail: request.thumbnail,
                status: None,
                updated_by: current_user.id,
            },
        )
        .await?;

    let mut widgets = Widgets::new(&mut tx);
    for widget_id in request.widgets_to_delete {
        if !widgets.delete_from_dashboard(id, widget_id).await? {
            return Err(widget_not_found(widget_id));
        }
    }

    for update in request.widgets_to_update {
        widgets
            .get_by_id(update.id)
            .await?
            .filter(|w| w.dashboard_id == id)
            .ok_or_else(|| widget_not_found(update.id))?;
        widgets
            .update(
                update.id,
                &WidgetUpdateDBRequest {
                    config: update.config,
                    parent_id: update.parent_id,
                    view_ids: update.view_ids,
                },
            )
            .await?;
    }

    for create in request.widgets_to_create {
        widgets
            .create(&WidgetCreateDBRequest {
                dashboard_id: id,
                config: create.config,
                parent_id: create.parent_id,
                view_ids: create.view_ids,
            })
            .await?;
    }

    let detail = detail(&mut tx, dashboard).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(ResponseData::success(detail))
}

/// Archive (default) or permanently delete a dashboard
#[utoipa::path(
    delete,
    path = "/viz/dashboards/{id}",
    tag = "dashboards",
    params(
        ("id" = uuid::Uuid, Path, description = "Dashboard ID"),
        DeleteDashboardQuery,
    ),
    responses(
        (status = 200, description = "Dashboard archived or deleted", body = ResponseData<bool>),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Dashboard not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(dashboard_id = %abbrev_uuid(&id), archive = query.archive))]
pub async fn delete_dashboard(
    State(state): State<AppState>,
    Path(id): Path<DashboardId>,
    Query(query): Query<DeleteDashboardQuery>,
    current_user: CurrentUser,
) -> Result<ResponseData<bool>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    load_dashboard(&mut tx, &current_user, id, Operation::Delete).await?;

    Folders::new(&mut tx).delete_by_rel(RelType::Dashboard, id).await?;
    if query.archive {
        set_status(&mut tx, id, DashboardStatus::Archived, current_user.id).await?;
    } else {
        Dashboards::new(&mut tx).delete(id).await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    tracing::info!(dashboard_id = %abbrev_uuid(&id), archived = query.archive, "Dashboard removed");

    Ok(ResponseData::success(true))
}

/// Bring an archived dashboard back into the folder tree
#[utoipa::path(
    put,
    path = "/viz/dashboards/{id}/restore",
    request_body = RestoreRequest,
    tag = "dashboards",
    params(("id" = uuid::Uuid, Path, description = "Dashboard ID")),
    responses(
        (status = 200, description = "Dashboard restored. Returns its new folder tree entry", body = ResponseData<FolderResponse>),
        (status = 400, description = "Dashboard is not archived, or the parent is invalid"),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Dashboard not found"),
        (status = 409, description = "A sibling already has this name"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(dashboard_id = %abbrev_uuid(&id)))]
pub async fn restore_dashboard(
    State(state): State<AppState>,
    Path(id): Path<DashboardId>,
    current_user: CurrentUser,
    Json(request): Json<RestoreRequest>,
) -> Result<ResponseData<FolderResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let dashboard = load_dashboard(&mut tx, &current_user, id, Operation::Update).await?;
    if dashboard.status != DashboardStatus::Archived {
        return Err(Error::BadRequest {
            message: format!("Dashboard {id} is not archived"),
        });
    }

    let name = match request.name.as_deref() {
        Some(name) => entry_name(name)?,
        None => dashboard.name.clone(),
    };
    check_parent(&mut tx, dashboard.org_id, request.parent_id).await?;
    check_name_free(&mut tx, dashboard.org_id, request.parent_id, &name, None).await?;

    let mut folders = Folders::new(&mut tx);
    let idx = match request.index {
        Some(index) => index,
        None => folders.next_index(dashboard.org_id, request.parent_id).await?,
    };
    let folder = folders
        .create(&FolderCreateDBRequest {
            org_id: dashboard.org_id,
            name: name.clone(),
            rel_type: RelType::Dashboard,
            rel_id: Some(id),
            parent_id: request.parent_id,
            idx,
            created_by: current_user.id,
        })
        .await?;

    Dashboards::new(&mut tx)
        .update(
            id,
            &DashboardUpdateDBRequest {
                name: (name != dashboard.name).then_some(name),
                config: None,
                thumbnail: None,
                status: Some(DashboardStatus::Active),
                updated_by: current_user.id,
            },
        )
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(ResponseData::success(FolderResponse::from(folder)))
}

async fn change_publication(state: &AppState, current_user: &CurrentUser, id: DashboardId, status: DashboardStatus) -> Result<DashboardBaseInfo> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let dashboard = load_dashboard(&mut conn, current_user, id, Operation::Update).await?;
    if dashboard.status == DashboardStatus::Archived {
        return Err(archived(id));
    }

    let dashboard = set_status(&mut conn, id, status, current_user.id).await?;
    Ok(DashboardBaseInfo::from(&dashboard))
}

/// Publish a dashboard
#[utoipa::path(
    put,
    path = "/viz/dashboards/{id}/publish",
    tag = "dashboards",
    params(("id" = uuid::Uuid, Path, description = "Dashboard ID")),
    responses(
        (status = 200, description = "Dashboard published", body = ResponseData<DashboardBaseInfo>),
        (status = 400, description = "Dashboard is archived"),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Dashboard not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(dashboard_id = %abbrev_uuid(&id)))]
pub async fn publish_dashboard(
    State(state): State<AppState>,
    Path(id): Path<DashboardId>,
    current_user: CurrentUser,
) -> Result<ResponseData<DashboardBaseInfo>> {
    let dashboard = change_publication(&state, &current_user, id, DashboardStatus::Published).await?;
    Ok(ResponseData::success(dashboard))
}

/// Take a published dashboard back to active
#[utoipa::path(
    put,
    path = "/viz/dashboards/{id}/unpublish",
    tag = "dashboards",
    params(("id" = uuid::Uuid, Path, description = "Dashboard ID")),
    responses(
        (status = 200, description = "Dashboard unpublished", body = ResponseData<DashboardBaseInfo>),
        (status = 400, description = "Dashboard is archived"),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Dashboard not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(dashboard_id = %abbrev_uuid(&id)))]
pub async fn unpublish_dashboard(
    State(state): State<AppState>,
    Path(id): Path<DashboardId>,
    current_user: CurrentUser,
) -> Result<ResponseData<DashboardBaseInfo>> {
    let dashboard = change_publication(&state, &current_user, id, DashboardStatus::Active).await?;
    Ok(ResponseData::success(dashboard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use axum_test::TestServer;
    use serde_json::{Value, json};
    use sqlx::SqlitePool;
    use uuid::Uuid;

    async fn post_dashboard(server: &TestServer, auth: &(String, String), body: Value) -> FolderResponse {
        let response = server.post("/api/v1/viz/dashboards").add_header(&auth.0, &auth.1).json(&body).await;
        response.assert_status(StatusCode::CREATED);
        let body: ResponseData<FolderResponse> = response.json();
        body.data.unwrap()
    }

    async fn fetch_detail(server: &TestServer, auth: &(String, String), id: Uuid) -> DashboardDetail {
        let response = server
            .get(&format!("/api/v1/viz/dashboards/{id}"))
            .add_header(&auth.0, &auth.1)
            .await;
        response.assert_status_ok();
        let body: ResponseData<DashboardDetail> = response.json();
        body.data.unwrap()
    }

    async fn list(server: &TestServer, auth: &(String, String), path: &str, org_id: Uuid) -> Vec<DashboardBaseInfo> {
        let response = server.get(path).add_query_param("org_id", org_id).add_header(&auth.0, &auth.1).await;
        response.assert_status_ok();
        let body: ResponseData<Vec<DashboardBaseInfo>> = response.json();
        body.data.unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_with_folder_and_detail(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        let entry = post_dashboard(
            &server,
            &auth,
            json!({ "org_id": org.id, "name": "Revenue", "config": { "theme": "dark" } }),
        )
        .await;
        assert_eq!(entry.rel_type, RelType::Dashboard);
        let dashboard_id = entry.rel_id.unwrap();

        let detail = fetch_detail(&server, &auth, dashboard_id).await;
        assert_eq!(detail.dashboard.name, "Revenue");
        assert_eq!(detail.dashboard.status, DashboardStatus::Active);
        assert_eq!(detail.config, Some(json!({ "theme": "dark" })));
        assert!(detail.widgets.is_empty());
        assert_eq!(detail.folder.unwrap().id, entry.id);

        let live = list(&server, &auth, "/api/v1/viz/dashboards", org.id).await;
        assert_eq!(live.len(), 1);

        // A dashboard cannot sit inside another dashboard
        server
            .post("/api/v1/viz/dashboards")
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "org_id": org.id, "name": "Nested", "parent_id": entry.id }))
            .await
            .assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_dashboards_require_membership(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let outsider = create_test_user(&pool, "outsider").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        let server = create_test_server(pool).await;

        let entry = post_dashboard(&server, &auth_header(&owner), json!({ "org_id": org.id, "name": "Private" })).await;
        let auth = auth_header(&outsider);

        server
            .get(&format!("/api/v1/viz/dashboards/{}", entry.rel_id.unwrap()))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_forbidden();
        server
            .get("/api/v1/viz/dashboards")
            .add_query_param("org_id", org.id)
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_forbidden();
        server
            .get(&format!("/api/v1/viz/dashboards/{}", Uuid::new_v4()))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_not_found();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_applies_widget_changes(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        let entry = post_dashboard(&server, &auth, json!({ "org_id": org.id, "name": "Revenue" })).await;
        let id = entry.rel_id.unwrap();
        let path = format!("/api/v1/viz/dashboards/{id}");

        let response = server
            .put(&path)
            .add_header(&auth.0, &auth.1)
            .json(&json!({
                "widgets_to_create": [
                    { "config": { "type": "chart" } },
                    { "config": { "type": "text" } }
                ]
            }))
            .await;
        response.assert_status_ok();
        let detail: ResponseData<DashboardDetail> = response.json();
        let widgets = detail.data.unwrap().widgets;
        assert_eq!(widgets.len(), 2);
        let chart = widgets.iter().find(|w| w.config["type"] == "chart").unwrap().id;
        let text = widgets.iter().find(|w| w.config["type"] == "text").unwrap().id;

        let response = server
            .put(&path)
            .add_header(&auth.0, &auth.1)
            .json(&json!({
                "name": "Revenue 2025",
                "widgets_to_update": [{ "id": chart, "config": { "type": "chart", "kind": "bar" } }],
                "widgets_to_delete": [text]
            }))
            .await;
        response.assert_status_ok();
        let detail: ResponseData<DashboardDetail> = response.json();
        let detail = detail.data.unwrap();
        assert_eq!(detail.dashboard.name, "Revenue 2025");
        assert_eq!(detail.widgets.len(), 1);
        assert_eq!(detail.widgets[0].config["kind"], "bar");
        // The tree entry follows the rename
        assert_eq!(detail.folder.unwrap().name, "Revenue 2025");

        // A failing widget change rolls back the whole update
        let response = server
            .put(&path)
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "name": "Broken", "widgets_to_delete": [Uuid::new_v4()] }))
            .await;
        response.assert_status_not_found();
        let detail = fetch_detail(&server, &auth, id).await;
        assert_eq!(detail.dashboard.name, "Revenue 2025");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_widgets_of_other_dashboards_are_untouchable(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        let first = post_dashboard(&server, &auth, json!({ "org_id": org.id, "name": "First" })).await.rel_id.unwrap();
        let second = post_dashboard(&server, &auth, json!({ "org_id": org.id, "name": "Second" })).await.rel_id.unwrap();

        let response = server
            .put(&format!("/api/v1/viz/dashboards/{first}"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "widgets_to_create": [{ "config": {} }] }))
            .await;
        let detail: ResponseData<DashboardDetail> = response.json();
        let widget = detail.data.unwrap().widgets[0].id;

        server
            .put(&format!("/api/v1/viz/dashboards/{second}"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "widgets_to_update": [{ "id": widget, "config": { "stolen": true } }] }))
            .await
            .assert_status_not_found();
        server
            .put(&format!("/api/v1/viz/dashboards/{second}"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "widgets_to_delete": [widget] }))
            .await
            .assert_status_not_found();

        assert_eq!(fetch_detail(&server, &auth, first).await.widgets.len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_archive_and_restore(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        let entry = post_dashboard(&server, &auth, json!({ "org_id": org.id, "name": "Revenue" })).await;
        let id = entry.rel_id.unwrap();

        server
            .delete(&format!("/api/v1/viz/dashboards/{id}"))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_ok();

        assert!(list(&server, &auth, "/api/v1/viz/dashboards", org.id).await.is_empty());
        let archived = list(&server, &auth, "/api/v1/viz/dashboards/archived", org.id).await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].status, DashboardStatus::Archived);
        assert!(fetch_detail(&server, &auth, id).await.folder.is_none());

        // Archived dashboards are read-only
        server
            .put(&format!("/api/v1/viz/dashboards/{id}"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "name": "Edited" }))
            .await
            .assert_status_bad_request();
        server
            .put(&format!("/api/v1/viz/dashboards/{id}/publish"))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_bad_request();

        // The old name is free again, so restoring under it after reuse needs a rename
        post_dashboard(&server, &auth, json!({ "org_id": org.id, "name": "Revenue" })).await;
        server
            .put(&format!("/api/v1/viz/dashboards/{id}/restore"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({}))
            .await
            .assert_status(StatusCode::CONFLICT);

        let response = server
            .put(&format!("/api/v1/viz/dashboards/{id}/restore"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "name": "Revenue (old)" }))
            .await;
        response.assert_status_ok();
        let restored: ResponseData<FolderResponse> = response.json();
        assert_eq!(restored.data.unwrap().rel_id, Some(id));

        let detail = fetch_detail(&server, &auth, id).await;
        assert_eq!(detail.dashboard.status, DashboardStatus::Active);
        assert_eq!(detail.dashboard.name, "Revenue (old)");

        server
            .put(&format!("/api/v1/viz/dashboards/{id}/restore"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({}))
            .await
            .assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_permanent_delete(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool.clone()).await;
        let auth = auth_header(&user);

        let entry = post_dashboard(&server, &auth, json!({ "org_id": org.id, "name": "Scratch" })).await;
        let id = entry.rel_id.unwrap();
        server
            .put(&format!("/api/v1/viz/dashboards/{id}"))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "widgets_to_create": [{ "config": {} }] }))
            .await
            .assert_status_ok();

        server
            .delete(&format!("/api/v1/viz/dashboards/{id}"))
            .add_query_param("archive", false)
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_ok();

        server
            .get(&format!("/api/v1/viz/dashboards/{id}"))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_not_found();

        let mut conn = pool.acquire().await.unwrap();
        assert!(Folders::new(&mut conn).get_by_id(entry.id).await.unwrap().is_none());
        let widgets = Widgets::new(&mut conn).list(&WidgetFilter { dashboard_id: id }).await.unwrap();
        assert!(widgets.is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_publish_and_unpublish(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        let id = post_dashboard(&server, &auth, json!({ "org_id": org.id, "name": "Revenue" })).await.rel_id.unwrap();

        let response = server
            .put(&format!("/api/v1/viz/dashboards/{id}/publish"))
            .add_header(&auth.0, &auth.1)
            .await;
        response.assert_status_ok();
        let body: ResponseData<DashboardBaseInfo> = response.json();
        assert_eq!(body.data.unwrap().status, DashboardStatus::Published);

        // Published dashboards stay in the live listing
        assert_eq!(list(&server, &auth, "/api/v1/viz/dashboards", org.id).await.len(), 1);

        let response = server
            .put(&format!("/api/v1/viz/dashboards/{id}/unpublish"))
            .add_header(&auth.0, &auth.1)
            .await;
        let body: ResponseData<DashboardBaseInfo> = response.json();
        assert_eq!(body.data.unwrap().status, DashboardStatus::Active);
    }
}
