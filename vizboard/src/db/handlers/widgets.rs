//! Database repository for dashboard widgets.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, types::Json};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::dashboards::{WidgetCreateDBRequest, WidgetDBResponse, WidgetFilter, WidgetUpdateDBRequest},
};
use crate::types::{DashboardId, WidgetId, abbrev_uuid};

pub struct Widgets<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Widgets<'c> {
    type CreateRequest = WidgetCreateDBRequest;
    type UpdateRequest = WidgetUpdateDBRequest;
    type Response = WidgetDBResponse;
    type Id = WidgetId;
    type Filter = WidgetFilter;

    #[instrument(skip(self, request), fields(dashboard_id = %abbrev_uuid(&request.dashboard_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let widget = sqlx::query_as::<_, WidgetDBResponse>(
            r#"
            INSERT INTO widgets (id, dashboard_id, config, parent_id, view_ids, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.dashboard_id)
        .bind(Json(&request.config))
        .bind(request.parent_id)
        .bind(Json(&request.view_ids))
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(widget)
    }

    #[instrument(skip(self), fields(widget_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let widget = sqlx::query_as::<_, WidgetDBResponse>("SELECT * FROM widgets WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(widget)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM widgets WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let widgets = query.build_query_as::<WidgetDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(widgets.into_iter().map(|w| (w.id, w)).collect())
    }

    #[instrument(skip(self, filter), fields(dashboard_id = %abbrev_uuid(&filter.dashboard_id)), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let widgets = sqlx::query_as::<_, WidgetDBResponse>("SELECT * FROM widgets WHERE dashboard_id = $1 ORDER BY created_at ASC")
            .bind(filter.dashboard_id)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(widgets)
    }

    #[instrument(skip(self), fields(widget_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM widgets WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(widget_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE widgets SET updated_at = ");
        query.push_bind(Utc::now());
        if let Some(config) = &request.config {
            query.push(", config = ").push_bind(Json(config.clone()));
        }
        if let Some(parent_id) = request.parent_id {
            query.push(", parent_id = ").push_bind(parent_id);
        }
        if let Some(view_ids) = &request.view_ids {
            query.push(", view_ids = ").push_bind(Json(view_ids.clone()));
        }
        query.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        let widget = query
            .build_query_as::<WidgetDBResponse>()
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;

        Ok(widget)
    }
}

impl<'c> Widgets<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Delete only if the widget belongs to `dashboard_id`.
    #[instrument(skip(self), fields(dashboard_id = %abbrev_uuid(&dashboard_id), widget_id = %abbrev_uuid(&id)), err)]
    pub async fn delete_from_dashboard(&mut self, dashboard_id: DashboardId, id: WidgetId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM widgets WHERE id = $1 AND dashboard_id = $2")
            .bind(id)
            .bind(dashboard_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
