//! Organization-scoped access checks.
//!
//! Every folder, dashboard and source belongs to an organization. Reads need membership, writes
//! to org settings and sources need the OWNER role. System admins pass every check.

use sqlx::SqliteConnection;
use tracing::instrument;

use crate::{
    api::models::users::CurrentUser,
    db::{handlers::Organizations, models::organizations::MemberRole},
    errors::{Error, Result},
    types::{OrgId, Operation, Permission, Resource, abbrev_uuid},
};

/// Fail unless `user` is a system admin.
pub fn require_admin(user: &CurrentUser, action: Operation, resource: Resource) -> Result<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            required: Permission::Admin,
            action,
            resource,
        })
    }
}

/// Fail unless `user` belongs to `org_id`. Returns the caller's role, `None` for admins who aren't members.
#[instrument(skip(conn, user), fields(user_id = %abbrev_uuid(&user.id), org_id = %abbrev_uuid(&org_id)), err)]
pub async fn require_org_member(
    conn: &mut SqliteConnection,
    user: &CurrentUser,
    org_id: OrgId,
    action: Operation,
    resource: Resource,
) -> Result<Option<MemberRole>> {
    let role = Organizations::new(conn).member_role(org_id, user.id).await?;
    if role.is_some() || user.is_admin {
        return Ok(role);
    }

    Err(Error::InsufficientPermissions {
        required: Permission::OrgMember,
        action,
        resource,
    })
}

/// Fail unless `user` owns `org_id`.
#[instrument(skip(conn, user), fields(user_id = %abbrev_uuid(&user.id), org_id = %abbrev_uuid(&org_id)), err)]
pub async fn require_org_owner(
    conn: &mut SqliteConnection,
    user: &CurrentUser,
    org_id: OrgId,
    action: Operation,
    resource: Resource,
) -> Result<()> {
    let role = Organizations::new(conn).member_role(org_id, user.id).await?;
    if role == Some(MemberRole::Owner) || user.is_admin {
        return Ok(());
    }

    Err(Error::InsufficientPermissions {
        required: Permission::OrgOwner,
        action,
        resource,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{add_test_member, create_test_admin, create_test_org, create_test_user};
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_member_and_owner_checks(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let member = create_test_user(&pool, "member").await;
        let outsider = create_test_user(&pool, "outsider").await;
        let org = create_test_org(&pool, owner.id, "analytics").await;
        add_test_member(&pool, org.id, member.id, MemberRole::Member).await;

        let mut conn = pool.acquire().await.unwrap();
        let (owner, member, outsider) = (CurrentUser::from(owner), CurrentUser::from(member), CurrentUser::from(outsider));

        let role = require_org_member(&mut conn, &owner, org.id, Operation::Read, Resource::Dashboards)
            .await
            .unwrap();
        assert_eq!(role, Some(MemberRole::Owner));
        let role = require_org_member(&mut conn, &member, org.id, Operation::Read, Resource::Dashboards)
            .await
            .unwrap();
        assert_eq!(role, Some(MemberRole::Member));

        let err = require_org_member(&mut conn, &outsider, org.id, Operation::Read, Resource::Dashboards)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientPermissions {
                required: Permission::OrgMember,
                ..
            }
        ));

        require_org_owner(&mut conn, &owner, org.id, Operation::Update, Resource::Sources)
            .await
            .unwrap();
        let err = require_org_owner(&mut conn, &member, org.id, Operation::Update, Resource::Sources)
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Insufficient permissions to update sources");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_bypasses_org_checks(pool: SqlitePool) {
        let owner = create_test_user(&pool, "owner").await;
        let admin = CurrentUser::from(create_test_admin(&pool).await);
        let org = create_test_org(&pool, owner.id, "finance").await;

        let mut conn = pool.acquire().await.unwrap();
        let role = require_org_member(&mut conn, &admin, org.id, Operation::Read, Resource::Folders)
            .await
            .unwrap();
        assert_eq!(role, None);
        require_org_owner(&mut conn, &admin, org.id, Operation::Delete, Resource::Members)
            .await
            .unwrap();
        require_admin(&admin, Operation::Read, Resource::Users).unwrap();
    }

    #[test]
    fn test_require_admin_rejects_regular_user() {
        let user = CurrentUser {
            id: uuid::Uuid::new_v4(),
            username: "user".to_string(),
            email: "user@example.com".to_string(),
            is_admin: false,
        };
        let err = require_admin(&user, Operation::Read, Resource::Users).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
    }
}
