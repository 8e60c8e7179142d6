//! Database repository for the folder tree.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::folders::{FolderCreateDBRequest, FolderDBResponse, FolderFilter, FolderUpdateDBRequest, RelType},
};
use crate::types::{FolderId, OrgId, abbrev_uuid};

pub struct Folders<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Folders<'c> {
    type CreateRequest = FolderCreateDBRequest;
    type UpdateRequest = FolderUpdateDBRequest;
    type Response = FolderDBResponse;
    type Id = FolderId;
    type Filter = FolderFilter;

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&request.org_id), name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let folder = sqlx::query_as::<_, FolderDBResponse>(
            r#"
            INSERT INTO folders (id, org_id, name, rel_type, rel_id, parent_id, idx, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.org_id)
        .bind(&request.name)
        .bind(request.rel_type)
        .bind(request.rel_id)
        .bind(request.parent_id)
        .bind(request.idx)
        .bind(request.created_by)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(folder)
    }

    #[instrument(skip(self), fields(folder_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let folder = sqlx::query_as::<_, FolderDBResponse>("SELECT * FROM folders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(folder)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM folders WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let folders = query.build_query_as::<FolderDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(folders.into_iter().map(|f| (f.id, f)).collect())
    }

    /// Every entry of the organization, ordered for rendering a tree.
    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&filter.org_id)), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM folders WHERE org_id = ");
        query.push_bind(filter.org_id);
        if let Some(rel_type) = filter.rel_type {
            query.push(" AND rel_type = ").push_bind(rel_type);
        }
        query.push(" ORDER BY idx ASC, name ASC");

        let folders = query.build_query_as::<FolderDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(folders)
    }

    #[instrument(skip(self), fields(folder_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(folder_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE folders SET updated_at = ");
        query.push_bind(Utc::now());
        if let Some(name) = &request.name {
            query.push(", name = ").push_bind(name.clone());
        }
        if let Some(parent_id) = request.parent_id {
            query.push(", parent_id = ").push_bind(parent_id);
        }
        if let Some(idx) = request.idx {
            query.push(", idx = ").push_bind(idx);
        }
        query.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let folder = query
            .build_query_as::<FolderDBResponse>()
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(folder)
    }
}

impl<'c> Folders<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// The tree entry pointing at a dashboard, if it is currently in the tree.
    #[instrument(skip(self), fields(rel_id = %abbrev_uuid(&rel_id)), err)]
    pub async fn get_by_rel(&mut self, rel_type: RelType, rel_id: Uuid) -> Result<Option<FolderDBResponse>> {
        let folder = sqlx::query_as::<_, FolderDBResponse>("SELECT * FROM folders WHERE rel_type = $1 AND rel_id = $2")
            .bind(rel_type)
            .bind(rel_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(folder)
    }

    #[instrument(skip(self), fields(rel_id = %abbrev_uuid(&rel_id)), err)]
    pub async fn delete_by_rel(&mut self, rel_type: RelType, rel_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM folders WHERE rel_type = $1 AND rel_id = $2")
            .bind(rel_type)
            .bind(rel_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(folder_id = %abbrev_uuid(&id)), err)]
    pub async fn count_children(&mut self, id: FolderId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM folders WHERE parent_id = $1")
            .bind(id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// True when `candidate` is `id` itself or sits somewhere below it.
    #[instrument(skip(self), fields(folder_id = %abbrev_uuid(&id), candidate = %abbrev_uuid(&candidate)), err)]
    pub async fn is_self_or_descendant(&mut self, id: FolderId, candidate: FolderId) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT $1
                UNION
                SELECT f.id FROM folders f JOIN subtree s ON f.parent_id = s.id
            )
            SELECT COUNT(*) FROM subtree WHERE id = $2
            "#,
        )
        .bind(id)
        .bind(candidate)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(found > 0)
    }

    /// Whether a sibling under `parent_id` already uses `name`.
    #[instrument(skip(self, name), fields(org_id = %abbrev_uuid(&org_id)), err)]
    pub async fn sibling_name_exists(
        &mut self,
        org_id: OrgId,
        parent_id: Option<FolderId>,
        name: &str,
        exclude: Option<FolderId>,
    ) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM folders
            WHERE org_id = $1 AND parent_id IS $2 AND name = $3 AND ($4 IS NULL OR id != $4)
            "#,
        )
        .bind(org_id)
        .bind(parent_id)
        .bind(name)
        .bind(exclude)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count > 0)
    }

    /// Next `idx` for appending under `parent_id`.
    #[instrument(skip(self), fields(org_id = %abbrev_uuid(&org_id)), err)]
    pub async fn next_index(&mut self, org_id: OrgId, parent_id: Option<FolderId>) -> Result<f64> {
        let max = sqlx::query_scalar::<_, Option<f64>>("SELECT MAX(idx) FROM folders WHERE org_id = $1 AND parent_id IS $2")
            .bind(org_id)
            .bind(parent_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(max.map_or(0.0, |m| m.floor() + 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Organizations, Users};
    use crate::db::models::{organizations::OrganizationCreateDBRequest, users::UserCreateDBRequest};
    use crate::types::UserId;
    use sqlx::SqlitePool;

    async fn setup(conn: &mut SqliteConnection) -> (UserId, OrgId) {
        let user = Users::new(conn)
            .create(&UserCreateDBRequest::registration(
                "folderuser".to_string(),
                "folder@example.com".to_string(),
                "hash".to_string(),
                true,
            ))
            .await
            .unwrap();
        let org = Organizations::new(conn)
            .create(&OrganizationCreateDBRequest {
                name: "folders".to_string(),
                description: None,
                avatar: None,
                created_by: user.id,
            })
            .await
            .unwrap();
        (user.id, org.id)
    }

    fn folder(org_id: OrgId, user_id: UserId, name: &str, parent_id: Option<FolderId>) -> FolderCreateDBRequest {
        FolderCreateDBRequest {
            org_id,
            name: name.to_string(),
            rel_type: RelType::Folder,
            rel_id: None,
            parent_id,
            idx: 0.0,
            created_by: user_id,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_tree_queries(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let (user_id, org_id) = setup(&mut conn).await;
        let mut repo = Folders::new(&mut conn);

        let root = repo.create(&folder(org_id, user_id, "root", None)).await.unwrap();
        let child = repo.create(&folder(org_id, user_id, "child", Some(root.id))).await.unwrap();
        let grandchild = repo.create(&folder(org_id, user_id, "grandchild", Some(child.id))).await.unwrap();
        let other = repo.create(&folder(org_id, user_id, "other", None)).await.unwrap();

        assert!(repo.is_self_or_descendant(root.id, root.id).await.unwrap());
        assert!(repo.is_self_or_descendant(root.id, grandchild.id).await.unwrap());
        assert!(!repo.is_self_or_descendant(child.id, root.id).await.unwrap());
        assert!(!repo.is_self_or_descendant(root.id, other.id).await.unwrap());

        assert_eq!(repo.count_children(root.id).await.unwrap(), 1);
        assert_eq!(repo.count_children(grandchild.id).await.unwrap(), 0);

        assert!(repo.sibling_name_exists(org_id, None, "root", None).await.unwrap());
        assert!(!repo.sibling_name_exists(org_id, None, "root", Some(root.id)).await.unwrap());
        assert!(repo.sibling_name_exists(org_id, Some(root.id), "child", None).await.unwrap());
        assert!(!repo.sibling_name_exists(org_id, None, "child", None).await.unwrap());

        assert_eq!(repo.next_index(org_id, Some(child.id)).await.unwrap(), 1.0);
        assert_eq!(repo.next_index(org_id, Some(grandchild.id)).await.unwrap(), 0.0);

        let all = repo.list(&FolderFilter { org_id, rel_type: None }).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_move_to_root_and_rename(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let (user_id, org_id) = setup(&mut conn).await;
        let mut repo = Folders::new(&mut conn);

        let root = repo.create(&folder(org_id, user_id, "root", None)).await.unwrap();
        let child = repo.create(&folder(org_id, user_id, "child", Some(root.id))).await.unwrap();

        let moved = repo
            .update(
                child.id,
                &FolderUpdateDBRequest {
                    name: Some("renamed".to_string()),
                    parent_id: Some(None),
                    idx: Some(3.5),
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.name, "renamed");
        assert_eq!(moved.parent_id, None);
        assert_eq!(moved.idx, 3.5);

        let untouched = repo.update(root.id, &FolderUpdateDBRequest::default()).await.unwrap();
        assert_eq!(untouched.name, "root");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_dashboard_entries_by_rel(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let (user_id, org_id) = setup(&mut conn).await;
        let mut repo = Folders::new(&mut conn);
        let dashboard_id = Uuid::new_v4();

        let mut request = folder(org_id, user_id, "sales", None);
        request.rel_type = RelType::Dashboard;
        request.rel_id = Some(dashboard_id);
        let entry = repo.create(&request).await.unwrap();

        // One tree entry per dashboard
        let err = repo.create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        let found = repo.get_by_rel(RelType::Dashboard, dashboard_id).await.unwrap().unwrap();
        assert_eq!(found.id, entry.id);

        let dashboards = repo
            .list(&FolderFilter {
                org_id,
                rel_type: Some(RelType::Dashboard),
            })
            .await
            .unwrap();
        assert_eq!(dashboards.len(), 1);

        assert!(repo.delete_by_rel(RelType::Dashboard, dashboard_id).await.unwrap());
        assert!(repo.get_by_rel(RelType::Dashboard, dashboard_id).await.unwrap().is_none());
    }
}
