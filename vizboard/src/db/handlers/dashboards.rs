//! Database repository for dashboards.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, types::Json};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::dashboards::{DashboardCreateDBRequest, DashboardDBResponse, DashboardFilter, DashboardUpdateDBRequest},
};
use crate::types::{DashboardId, abbrev_uuid};

pub struct Dashboards<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Dashboards<'c> {
    type CreateRequest = DashboardCreateDBRequest;
    type UpdateRequest = DashboardUpdateDBRequest;
    type Response = DashboardDBResponse;
    type Id = DashboardId;
    type Filter = DashboardFilter;

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&request.org_id), name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let dashboard = sqlx::query_as::<_, DashboardDBResponse>(
            r#"
            INSERT INTO dashboards (id, org_id, name, config, thumbnail, status, created_by, updated_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 1, $6, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.org_id)
        .bind(&request.name)
        .bind(request.config.as_ref().map(Json))
        .bind(&request.thumbnail)
        .bind(request.created_by)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(dashboard)
    }

    #[instrument(skip(self), fields(dashboard_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let dashboard = sqlx::query_as::<_, DashboardDBResponse>("SELECT * FROM dashboards WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(dashboard)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM dashboards WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let dashboards = query.build_query_as::<DashboardDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(dashboards.into_iter().map(|d| (d.id, d)).collect())
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&filter.org_id), limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM dashboards WHERE org_id = ");
        query.push_bind(filter.org_id);
        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(*status);
            }
            separated.push_unseparated(")");
        }
        query
            .push(" ORDER BY updated_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.skip);

        let dashboards = query.build_query_as::<DashboardDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(dashboards)
    }

    /// Widgets go with the dashboard through the foreign key cascade.
    #[instrument(skip(self), fields(dashboard_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dashboards WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(dashboard_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let dashboard = sqlx::query_as::<_, DashboardDBResponse>(
            r#"
            UPDATE dashboards SET
                name = COALESCE($2, name),
                config = COALESCE($3, config),
                thumbnail = COALESCE($4, thumbnail),
                status = COALESCE($5, status),
                updated_by = $6,
                updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.config.as_ref().map(Json))
        .bind(&request.thumbnail)
        .bind(request.status)
        .bind(request.updated_by)
        .bind(Utc::now())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(dashboard)
    }
}

impl<'c> Dashboards<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }
}
