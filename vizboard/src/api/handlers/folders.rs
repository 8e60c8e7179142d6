//! Folder tree handlers.
//!
//! The tree holds two kinds of entries: plain folders and DASHBOARD leaves pointing at a
//! dashboard. Leaves are created, archived and deleted through the dashboard routes. Here they
//! can only be renamed or moved.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::SqliteConnection;

use crate::{
    AppState,
    api::models::{
        folders::{FolderCreate, FolderResponse, FolderUpdate, OrgQuery},
        response::ResponseData,
        users::CurrentUser,
    },
    auth::permissions::require_org_member,
    db::{
        handlers::{Dashboards, Folders, Repository},
        models::{
            dashboards::DashboardUpdateDBRequest,
            folders::{FolderCreateDBRequest, FolderDBResponse, FolderFilter, FolderUpdateDBRequest, RelType},
        },
    },
    errors::{Error, Result},
    types::{FolderId, OrgId, Operation, Resource, abbrev_uuid},
};

/// Trimmed, non-empty entry name.
pub(crate) fn entry_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Name is required".to_string(),
        });
    }
    Ok(name.to_string())
}

/// A parent must be a plain folder in the same organization. `None` is the root.
pub(crate) async fn check_parent(conn: &mut SqliteConnection, org_id: OrgId, parent_id: Option<FolderId>) -> Result<()> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };

    let parent = Folders::new(conn)
        .get_by_id(parent_id)
        .await?
        .filter(|p| p.org_id == org_id)
        .ok_or_else(|| Error::BadRequest {
            message: format!("Parent folder {parent_id} not found"),
        })?;

    if parent.rel_type != RelType::Folder {
        return Err(Error::BadRequest {
            message: "Parent must be a folder".to_string(),
        });
    }
    Ok(())
}

/// Sibling entries must have distinct names.
pub(crate) async fn check_name_free(
    conn: &mut SqliteConnection,
    org_id: OrgId,
    parent_id: Option<FolderId>,
    name: &str,
    exclude: Option<FolderId>,
) -> Result<()> {
    if Folders::new(conn).sibling_name_exists(org_id, parent_id, name, exclude).await? {
        return Err(Error::Conflict {
            message: format!("An entry named '{name}' already exists in this folder"),
        });
    }
    Ok(())
}

async fn load_folder(conn: &mut SqliteConnection, id: FolderId) -> Result<FolderDBResponse> {
    Folders::new(conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Folder".to_string(),
        id: id.to_string(),
    })
}

/// List every folder tree entry of an organization
#[utoipa::path(
    get,
    path = "/viz/folders",
    tag = "folders",
    params(OrgQuery),
    responses(
        (status = 200, description = "Tree entries ordered by index", body = ResponseData<Vec<FolderResponse>>),
        (status = 403, description = "Not a member of the organization"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&query.org_id)))]
pub async fn list_folders(
    State(state): State<AppState>,
    Query(query): Query<OrgQuery>,
    current_user: CurrentUser,
) -> Result<ResponseData<Vec<FolderResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    require_org_member(&mut conn, &current_user, query.org_id, Operation::Read, Resource::Folders).await?;

    let folders = Folders::new(&mut conn)
        .list(&FolderFilter {
            org_id: query.org_id,
            rel_type: None,
        })
        .await?;

    Ok(ResponseData::success(folders.into_iter().map(FolderResponse::from).collect()))
}

/// Create a plain folder
#[utoipa::path(
    post,
    path = "/viz/folders",
    request_body = FolderCreate,
    tag = "folders",
    responses(
        (status = 201, description = "Folder created", body = ResponseData<FolderResponse>),
        (status = 400, description = "Blank name or invalid parent"),
        (status = 403, description = "Not a member of the organization"),
        (status = 409, description = "A sibling already has this name"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&request.org_id)))]
pub async fn create_folder(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<FolderCreate>,
) -> Result<(StatusCode, ResponseData<FolderResponse>)> {
    let name = entry_name(&request.name)?;
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    require_org_member(&mut tx, &current_user, request.org_id, Operation::Create, Resource::Folders).await?;
    check_parent(&mut tx, request.org_id, request.parent_id).await?;
    check_name_free(&mut tx, request.org_id, request.parent_id, &name, None).await?;

    let mut folders = Folders::new(&mut tx);
    let idx = match request.index {
        Some(index) => index,
        None => folders.next_index(request.org_id, request.parent_id).await?,
    };
    let folder = folders
        .create(&FolderCreateDBRequest {
            org_id: request.org_id,
            name,
            rel_type: RelType::Folder,
            rel_id: None,
            parent_id: request.parent_id,
            idx,
            created_by: current_user.id,
        })
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok((StatusCode::CREATED, ResponseData::success(FolderResponse::from(folder))))
}

/// Rename or move a tree entry
#[utoipa::path(
    put,
    path = "/viz/folders/{id}",
    request_body = FolderUpdate,
    tag = "folders",
    params(("id" = uuid::Uuid, Path, description = "Folder entry ID")),
    responses(
        (status = 200, description = "Entry updated", body = ResponseData<FolderResponse>),
        (status = 400, description = "Invalid parent or a move into its own subtree"),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Entry not found"),
        (status = 409, description = "A sibling already has this name"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(folder_id = %abbrev_uuid(&id)))]
pub async fn update_folder(
    State(state): State<AppState>,
    Path(id): Path<FolderId>,
    current_user: CurrentUser,
    Json(request): Json<FolderUpdate>,
) -> Result<ResponseData<FolderResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let folder = load_folder(&mut tx, id).await?;
    require_org_member(&mut tx, &current_user, folder.org_id, Operation::Update, Resource::Folders).await?;

    let name = match request.name.as_deref() {
        Some(name) => entry_name(name)?,
        None => folder.name.clone(),
    };
    let parent_id = request.parent_id.unwrap_or(folder.parent_id);

    if let Some(Some(new_parent)) = request.parent_id {
        check_parent(&mut tx, folder.org_id, Some(new_parent)).await?;
        if Folders::new(&mut tx).is_self_or_descendant(folder.id, new_parent).await? {
            return Err(Error::BadRequest {
                message: "A folder cannot be moved into itself or one of its subfolders".to_string(),
            });
        }
    }

    let renamed = name != folder.name;
    if renamed || parent_id != folder.parent_id {
        check_name_free(&mut tx, folder.org_id, parent_id, &name, Some(folder.id)).await?;
    }

    let updated = Folders::new(&mut tx)
        .update(
            id,
            &FolderUpdateDBRequest {
                name: renamed.then(|| name.clone()),
                parent_id: request.parent_id,
                idx: request.index,
            },
        )
        .await?;

    // Dashboard leaves carry the dashboard's name
    if renamed && folder.rel_type == RelType::Dashboard {
        if let Some(dashboard_id) = folder.rel_id {
            Dashboards::new(&mut tx)
                .update(
                    dashboard_id,
                    &DashboardUpdateDBRequest {
                        name: Some(name),
                        config: None,
                        thumbnail: None,
                        status: None,
                        updated_by: current_user.id,
                    },
                )
                .await?;
        }
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(ResponseData::success(FolderResponse::from(updated)))
}

/// Delete an empty plain folder
#[utoipa::path(
    delete,
    path = "/viz/folders/{id}",
    tag = "folders",
    params(("id" = uuid::Uuid, Path, description = "Folder entry ID")),
    responses(
        (status = 200, description = "Folder deleted", body = ResponseData<bool>),
        (status = 400, description = "Folder is not empty, or the entry is a dashboard"),
        (status = 403, description = "Not a member of the organization"),
        (status = 404, description = "Entry not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(folder_id = %abbrev_uuid(&id)))]
pub async fn delete_folder(
    State(state): State<AppState>,
    Path(id): Path<FolderId>,
    current_user: CurrentUser,
) -> Result<ResponseData<bool>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let folder = load_folder(&mut tx, id).await?;
    require_org_member(&mut tx, &current_user, folder.org_id, Operation::Delete, Resource::Folders).await?;

    if folder.rel_type == RelType::Dashboard {
        return Err(Error::BadRequest {
            message: "Dashboards are removed through the dashboard endpoints".to_string(),
        });
    }

    let mut folders = Folders::new(&mut tx);
    if folders.count_children(id).await? > 0 {
        return Err(Error::BadRequest {
            message: "Folder is not empty".to_string(),
        });
    }
    folders.delete(id).await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok(ResponseData::success(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use serde_json::{Value, json};
    use sqlx::SqlitePool;

    async fn post_folder(server: &axum_test::TestServer, auth: &(String, String), body: Value) -> FolderResponse {
        let response = server.post("/api/v1/viz/folders").add_header(&auth.0, &auth.1).json(&body).await;
        response.assert_status(StatusCode::CREATED);
        let body: ResponseData<FolderResponse> = response.json();
        body.data.unwrap()
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_list_folders(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        let reports = post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Reports" })).await;
        assert_eq!(reports.rel_type, RelType::Folder);
        assert_eq!(reports.index, 0.0);

        let archive = post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Archive" })).await;
        assert_eq!(archive.index, 1.0);

        let nested = post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Q1", "parent_id": reports.id })).await;
        assert_eq!(nested.parent_id, Some(reports.id));
        assert_eq!(nested.index, 0.0);

        let response = server
            .get("/api/v1/viz/folders")
            .add_query_param("org_id", org.id)
            .add_header(&auth.0, &auth.1)
            .await;
        response.assert_status_ok();
        let list: ResponseData<Vec<FolderResponse>> = response.json();
        assert_eq!(list.data.unwrap().len(), 3);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_folder_validation(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let other_org = create_test_org(&pool, user.id, "elsewhere").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Reports" })).await;

        let response = server
            .post("/api/v1/viz/folders")
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "org_id": org.id, "name": "Reports" }))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        server
            .post("/api/v1/viz/folders")
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "org_id": org.id, "name": "  " }))
            .await
            .assert_status_bad_request();

        // A parent from another organization is rejected
        let foreign = post_folder(&server, &auth, json!({ "org_id": other_org.id, "name": "Foreign" })).await;
        server
            .post("/api/v1/viz/folders")
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "org_id": org.id, "name": "Child", "parent_id": foreign.id }))
            .await
            .assert_status_bad_request();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_folders_require_membership(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let outsider = create_test_user(&pool, "outsider").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&outsider);

        server
            .get("/api/v1/viz/folders")
            .add_query_param("org_id", org.id)
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_forbidden();
        server
            .post("/api/v1/viz/folders")
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "org_id": org.id, "name": "Sneaky" }))
            .await
            .assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_move_and_rename(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        let parent = post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Parent" })).await;
        let child = post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Child", "parent_id": parent.id })).await;
        let grandchild =
            post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Grandchild", "parent_id": child.id })).await;

        // Cycles are rejected
        for target in [parent.id, child.id, grandchild.id] {
            server
                .put(&format!("/api/v1/viz/folders/{}", parent.id))
                .add_header(&auth.0, &auth.1)
                .json(&json!({ "parent_id": target }))
                .await
                .assert_status_bad_request();
        }

        // Move the grandchild to the root and rename it
        let response = server
            .put(&format!("/api/v1/viz/folders/{}", grandchild.id))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "parent_id": null, "name": "Top level" }))
            .await;
        response.assert_status_ok();
        let moved: ResponseData<FolderResponse> = response.json();
        let moved = moved.data.unwrap();
        assert_eq!(moved.parent_id, None);
        assert_eq!(moved.name, "Top level");

        // Renaming onto a sibling's name conflicts
        server
            .put(&format!("/api/v1/viz/folders/{}", moved.id))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "name": "Parent" }))
            .await
            .assert_status(StatusCode::CONFLICT);

        // Omitting parent_id leaves the entry where it is
        let response = server
            .put(&format!("/api/v1/viz/folders/{}", child.id))
            .add_header(&auth.0, &auth.1)
            .json(&json!({ "index": 5.5 }))
            .await;
        let unmoved: ResponseData<FolderResponse> = response.json();
        let unmoved = unmoved.data.unwrap();
        assert_eq!(unmoved.parent_id, Some(parent.id));
        assert_eq!(unmoved.index, 5.5);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_folder(pool: SqlitePool) {
        let user = create_test_user(&pool, "ada").await;
        let org = create_test_org(&pool, user.id, "analytics").await;
        let server = create_test_server(pool).await;
        let auth = auth_header(&user);

        let parent = post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Parent" })).await;
        let child = post_folder(&server, &auth, json!({ "org_id": org.id, "name": "Child", "parent_id": parent.id })).await;

        let response = server
            .delete(&format!("/api/v1/viz/folders/{}", parent.id))
            .add_header(&auth.0, &auth.1)
            .await;
        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["message"], "Folder is not empty");

        server
            .delete(&format!("/api/v1/viz/folders/{}", child.id))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_ok();
        server
            .delete(&format!("/api/v1/viz/folders/{}", parent.id))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_ok();
        server
            .delete(&format!("/api/v1/viz/folders/{}", parent.id))
            .add_header(&auth.0, &auth.1)
            .await
            .assert_status_not_found();
    }
}
