//! Database repository for organizations and memberships.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Connection, QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::organizations::{
        MemberRole, OrgMemberDBResponse, OrganizationCreateDBRequest, OrganizationDBResponse, OrganizationFilter,
        OrganizationUpdateDBRequest,
    },
};
use crate::types::{OrgId, UserId, abbrev_uuid};

pub struct Organizations<'c> {
    db: &'c mut SqliteConnection,
}

const MEMBER_COLUMNS: &str = r#"
    SELECT m.org_id, m.user_id, m.role, m.created_at, u.username, u.email, u.name, u.avatar
    FROM org_members m
    JOIN users u ON u.id = m.user_id
"#;

#[async_trait::async_trait]
impl<'c> Repository for Organizations<'c> {
    type CreateRequest = OrganizationCreateDBRequest;
    type UpdateRequest = OrganizationUpdateDBRequest;
    type Response = OrganizationDBResponse;
    type Id = OrgId;
    type Filter = OrganizationFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let org = sqlx::query_as::<_, OrganizationDBResponse>(
            r#"
            INSERT INTO organizations (id, name, description, avatar, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.avatar)
        .bind(request.created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO org_members (org_id, user_id, role, created_at) VALUES ($1, $2, $3, $4)")
            .bind(org.id)
            .bind(request.created_by)
            .bind(MemberRole::Owner)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(org)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>("SELECT * FROM organizations WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(org)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM organizations WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let orgs = query.build_query_as::<OrganizationDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(orgs.into_iter().map(|o| (o.id, o)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT o.* FROM organizations o");
        if let Some(member_id) = filter.member_id {
            query
                .push(" JOIN org_members m ON m.org_id = o.id AND m.user_id = ")
                .push_bind(member_id);
        }
        query
            .push(" ORDER BY o.created_at ASC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.skip);

        let orgs = query.build_query_as::<OrganizationDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(orgs)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let org = sqlx::query_as::<_, OrganizationDBResponse>(
            r#"
            UPDATE organizations SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                avatar = COALESCE($4, avatar),
                updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.avatar)
        .bind(Utc::now())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(org)
    }
}

impl<'c> Organizations<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// The user's role in the organization, or `None` when they are not a member.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn member_role(&mut self, org_id: OrgId, user_id: UserId) -> Result<Option<MemberRole>> {
        let role = sqlx::query_scalar::<_, MemberRole>("SELECT role FROM org_members WHERE org_id = $1 AND user_id = $2")
            .bind(org_id)
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(role)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id)), err)]
    pub async fn list_members(&mut self, org_id: OrgId) -> Result<Vec<OrgMemberDBResponse>> {
        let members = sqlx::query_as::<_, OrgMemberDBResponse>(&format!(
            "{MEMBER_COLUMNS} WHERE m.org_id = $1 ORDER BY m.role DESC, m.created_at ASC"
        ))
        .bind(org_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(members)
    }

    /// Adding an existing member is a unique violation on `org_members`.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn add_member(&mut self, org_id: OrgId, user_id: UserId, role: MemberRole) -> Result<OrgMemberDBResponse> {
        sqlx::query("INSERT INTO org_members (org_id, user_id, role, created_at) VALUES ($1, $2, $3, $4)")
            .bind(org_id)
            .bind(user_id)
            .bind(role)
            .bind(Utc::now())
            .execute(&mut *self.db)
            .await?;

        let member = sqlx::query_as::<_, OrgMemberDBResponse>(&format!("{MEMBER_COLUMNS} WHERE m.org_id = $1 AND m.user_id = $2"))
            .bind(org_id)
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(member)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn remove_member(&mut self, org_id: OrgId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM org_members WHERE org_id = $1 AND user_id = $2")
            .bind(org_id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id)), err)]
    pub async fn count_owners(&mut self, org_id: OrgId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM org_members WHERE org_id = $1 AND role = $2")
            .bind(org_id)
            .bind(MemberRole::Owner)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    #[instrument(skip(self), err)]
    pub async fn name_exists(&mut self, name: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM organizations WHERE name = $1")
            .bind(name)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count > 0)
    }
}
