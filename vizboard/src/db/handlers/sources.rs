//! Database repository for data sources.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, types::Json};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::sources::{SourceCreateDBRequest, SourceDBResponse, SourceFilter, SourceUpdateDBRequest},
};
use crate::types::{SourceId, abbrev_uuid};

pub struct Sources<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Sources<'c> {
    type CreateRequest = SourceCreateDBRequest;
    type UpdateRequest = SourceUpdateDBRequest;
    type Response = SourceDBResponse;
    type Id = SourceId;
    type Filter = SourceFilter;

    #[instrument(skip(self, request), fields(org_id = %abbrev_uuid(&request.org_id), name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let source = sqlx::query_as::<_, SourceDBResponse>(
            r#"
            INSERT INTO sources (id, org_id, name, source_type, config, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.org_id)
        .bind(&request.name)
        .bind(&request.source_type)
        .bind(Json(&request.config))
        .bind(request.created_by)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(source)
    }

    #[instrument(skip(self), fields(source_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let source = sqlx::query_as::<_, SourceDBResponse>("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(source)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM sources WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let sources = query.build_query_as::<SourceDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(sources.into_iter().map(|s| (s.id, s)).collect())
    }

    #[instrument(skip(self, filter), fields(org_id = %abbrev_uuid(&filter.org_id), limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let sources =
            sqlx::query_as::<_, SourceDBResponse>("SELECT * FROM sources WHERE org_id = $1 ORDER BY name ASC LIMIT $2 OFFSET $3")
                .bind(filter.org_id)
                .bind(filter.limit)
                .bind(filter.skip)
                .fetch_all(&mut *self.db)
                .await?;

        Ok(sources)
    }

    #[instrument(skip(self), fields(source_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sources WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(source_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let source = sqlx::query_as::<_, SourceDBResponse>(
            r#"
            UPDATE sources SET
                name = COALESCE($2, name),
                config = COALESCE($3, config),
                updated_at = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.config.as_ref().map(Json))
        .bind(Utc::now())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(source)
    }
}

impl<'c> Sources<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }
}
