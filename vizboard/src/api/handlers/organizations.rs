use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        organizations::{AddMemberRequest, OrgMemberResponse, OrganizationCreate, OrganizationResponse},
        response::ResponseData,
        users::CurrentUser,
    },
    auth::permissions::{require_org_member, require_org_owner},
    db::{
        handlers::{Organizations, Repository, Users},
        models::organizations::{MemberRole, OrganizationCreateDBRequest, OrganizationFilter},
    },
    errors::{Error, Result},
    types::{OrgId, Operation, Resource, UserId, abbrev_uuid},
};

fn org_not_found(id: OrgId) -> Error {
    Error::NotFound {
        resource: "Organization".to_string(),
        id: id.to_string(),
    }
}

/// List the organizations the current user belongs to
#[utoipa::path(
    get,
    path = "/orgs",
    tag = "organizations",
    responses(
        (status = 200, description = "Organizations of the current user", body = ResponseData<Vec<OrganizationResponse>>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_organizations(State(state): State<AppState>, current_user: CurrentUser) -> Result<ResponseData<Vec<OrganizationResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let orgs = Organizations::new(&mut conn)
        .list(&OrganizationFilter {
            member_id: Some(current_user.id),
            skip: 0,
            limit: i64::MAX,
        })
        .await?;

    Ok(ResponseData::success(orgs.into_iter().map(OrganizationResponse::from).collect()))
}

/// Create an organization owned by the current user
#[utoipa::path(
    post,
    path = "/orgs",
    request_body = OrganizationCreate,
    tag = "organizations",
    responses(
        (status = 201, description = "Organization created", body = ResponseData<OrganizationResponse>),
        (status = 400, description = "Blank name"),
        (status = 409, description = "Name already taken"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_organization(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(request): Json<OrganizationCreate>,
) -> Result<(StatusCode, ResponseData<OrganizationResponse>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::BadRequest {
            message: "Organization name is required".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let org = Organizations::new(&mut conn)
        .create(&OrganizationCreateDBRequest {
            name: name.to_string(),
            description: request.description,
            avatar: request.avatar,
            created_by: current_user.id,
        })
        .await?;

    Ok((StatusCode::CREATED, ResponseData::success(OrganizationResponse::from(org))))
}

/// Get one organization
#[utoipa::path(
    get,
    path = "/orgs/{id}",
    tag = "organizations",
    params(("id" = uuid::Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Organization", body = ResponseData<OrganizationResponse>),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Organization not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&id)))]
pub async fn get_organization(
    State(state): State<AppState>,
    Path(id): Path<OrgId>,
    current_user: CurrentUser,
) -> Result<ResponseData<OrganizationResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let org = Organizations::new(&mut conn).get_by_id(id).await?.ok_or_else(|| org_not_found(id))?;
    require_org_member(&mut conn, &current_user, id, Operation::Read, Resource::Organizations).await?;

    Ok(ResponseData::success(OrganizationResponse::from(org)))
}

/// List members of an organization
#[utoipa::path(
    get,
    path = "/orgs/{id}/members",
    tag = "organizations",
    params(("id" = uuid::Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Members, owners first", body = ResponseData<Vec<OrgMemberResponse>>),
        (status = 403, description = "Not a member"),
        (status = 404, description = "Organization not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&id)))]
pub async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<OrgId>,
    current_user: CurrentUser,
) -> Result<ResponseData<Vec<OrgMemberResponse>>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    Organizations::new(&mut conn).get_by_id(id).await?.ok_or_else(|| org_not_found(id))?;
    require_org_member(&mut conn, &current_user, id, Operation::Read, Resource::Members).await?;

    let members = Organizations::new(&mut conn).list_members(id).await?;
    Ok(ResponseData::success(members.into_iter().map(OrgMemberResponse::from).collect()))
}

/// Add a user to an organization
#[utoipa::path(
    post,
    path = "/orgs/{id}/members/{user_id}",
    request_body = AddMemberRequest,
    tag = "organizations",
    params(
        ("id" = uuid::Uuid, Path, description = "Organization ID"),
        ("user_id" = uuid::Uuid, Path, description = "User to add"),
    ),
    responses(
        (status = 201, description = "Member added", body = ResponseData<OrgMemberResponse>),
        (status = 403, description = "Caller is not an owner"),
        (status = 404, description = "Organization or user not found"),
        (status = 409, description = "Already a member"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&id), user_id = %abbrev_uuid(&user_id)))]
pub async fn add_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(OrgId, UserId)>,
    current_user: CurrentUser,
    Json(request): Json<AddMemberRequest>,
) -> Result<(StatusCode, ResponseData<OrgMemberResponse>)> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    Organizations::new(&mut tx).get_by_id(id).await?.ok_or_else(|| org_not_found(id))?;
    require_org_owner(&mut tx, &current_user, id, Operation::Create, Resource::Members).await?;

    Users::new(&mut tx).get_by_id(user_id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: user_id.to_string(),
    })?;

    let member = Organizations::new(&mut tx)
        .add_member(id, user_id, request.role.unwrap_or(MemberRole::Member))
        .await?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    Ok((StatusCode::CREATED, ResponseData::success(OrgMemberResponse::from(member))))
}

/// Remove a user from an organization. The last owner cannot be removed.
#[utoipa::path(
    delete,
    path = "/orgs/{id}/members/{user_id}",
    tag = "organizations",
    params(
        ("id" = uuid::Uuid, Path, description = "Organization ID"),
        ("user_id" = uuid::Uuid, Path, description = "User to remove"),
    ),
    responses(
        (status = 200, description = "Member removed", body = ResponseData<bool>),
        (status = 400, description = "Would remove the last owner"),
        (status = 403, description = "Caller is not an owner"),
        (status = 404, description = "Organization not found or user is not a member"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(org_id = %abbrev_uuid(&id), user_id = %abbrev_uuid(&user_id)))]
pub async fn remove_member(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(OrgId, UserId)>,
    current_user: CurrentUser,
) -> Result<ResponseData<bool>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    Organizations::new(&mut tx).get_by_id(id).await?.ok_or_else(|| org_not_found(id))?;
    require_org_owner(&mut tx, &current_user, id, Operation::Delete, Resource::Members).await?;

    let mut orgs = Organizations::new(&mut tx);
    let role = orgs.member_role(id, user_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Member".to_string(),
        id: user_id.to_string(),
    })?;

    if role == MemberRole::Owner && orgs.count_owners(id).await? <= 1 {
        return Err(Error::BadRequest {
            message: "Cannot remove the last owner of an organization".to_string(),
        });
    }

    orgs.remove_member(id, user_id).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(ResponseData::success(true))
}
