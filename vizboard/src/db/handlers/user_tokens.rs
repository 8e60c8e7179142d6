//! Database repository for activation and password reset tokens.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::user_tokens::{TokenPurpose, UserTokenCreateDBRequest, UserTokenDBResponse, UserTokenFilter, UserTokenUpdateDBRequest},
};
use crate::types::{UserId, abbrev_uuid};

pub struct UserTokens<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for UserTokens<'c> {
    type CreateRequest = UserTokenCreateDBRequest;
    type UpdateRequest = UserTokenUpdateDBRequest;
    type Response = UserTokenDBResponse;
    type Id = Uuid;
    type Filter = UserTokenFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id), purpose = ?request.purpose), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let token = sqlx::query_as::<_, UserTokenDBResponse>(
            r#"
            INSERT INTO user_tokens (id, user_id, purpose, token_hash, verify_code_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(request.purpose)
        .bind(&request.token_hash)
        .bind(&request.verify_code_hash)
        .bind(request.expires_at)
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    #[instrument(skip(self), fields(token_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let token = sqlx::query_as::<_, UserTokenDBResponse>("SELECT * FROM user_tokens WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(token)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM user_tokens WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let tokens = query.build_query_as::<UserTokenDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(tokens.into_iter().map(|t| (t.id, t)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM user_tokens WHERE 1=1");
        if let Some(user_id) = filter.user_id {
            query.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(purpose) = filter.purpose {
            query.push(" AND purpose = ").push_bind(purpose);
        }
        query
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.skip);

        let tokens = query.build_query_as::<UserTokenDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(tokens)
    }

    #[instrument(skip(self, request), fields(token_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let token = sqlx::query_as::<_, UserTokenDBResponse>(
            "UPDATE user_tokens SET used_at = COALESCE($2, used_at) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(request.used_at)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(token)
    }

    #[instrument(skip(self), fields(token_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_tokens WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl<'c> UserTokens<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Mark every outstanding token of `purpose` for the user as used.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn invalidate_for_user(&mut self, user_id: UserId, purpose: TokenPurpose) -> Result<u64> {
        let result = sqlx::query("UPDATE user_tokens SET used_at = $3 WHERE user_id = $1 AND purpose = $2 AND used_at IS NULL")
            .bind(user_id)
            .bind(purpose)
            .bind(Utc::now())
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }

    /// Claim a token. Returns false when it was already used, so concurrent redemptions cannot both win.
    #[instrument(skip(self), fields(token_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_used(&mut self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE user_tokens SET used_at = $2 WHERE id = $1 AND used_at IS NULL")
            .bind(id)
            .bind(Utc::now())
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count a wrong verify code. The token is spent once `max_attempts` is reached.
    /// Returns the attempts recorded so far.
    #[instrument(skip(self), fields(token_id = %abbrev_uuid(&id)), err)]
    pub async fn record_failed_attempt(&mut self, id: Uuid, max_attempts: i64) -> Result<i64> {
        let attempts = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE user_tokens SET
                failed_attempts = failed_attempts + 1,
                used_at = CASE WHEN failed_attempts + 1 >= $2 THEN COALESCE(used_at, $3) ELSE used_at END
            WHERE id = $1
            RETURNING failed_attempts
            "#,
        )
        .bind(id)
        .bind(max_attempts)
        .bind(Utc::now())
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Users;
    use crate::db::models::users::UserCreateDBRequest;
    use chrono::Duration;
    use sqlx::SqlitePool;

    async fn create_user(conn: &mut SqliteConnection) -> UserId {
        Users::new(conn)
            .create(&UserCreateDBRequest::registration(
                "tokenuser".to_string(),
                "token@example.com".to_string(),
                "hash".to_string(),
                false,
            ))
            .await
            .unwrap()
            .id
    }

    fn token_request(user_id: UserId, purpose: TokenPurpose) -> UserTokenCreateDBRequest {
        UserTokenCreateDBRequest {
            id: Uuid::new_v4(),
            user_id,
            purpose,
            token_hash: "token-hash".to_string(),
            verify_code_hash: None,
            expires_at: Utc::now() + Duration::minutes(30),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_mark_used_once(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn).await;
        let mut repo = UserTokens::new(&mut conn);

        let request = token_request(user_id, TokenPurpose::Activation);
        let token = repo.create(&request).await.unwrap();
        assert_eq!(token.id, request.id);
        assert_eq!(token.purpose, TokenPurpose::Activation);
        assert!(token.is_live(Utc::now()));

        assert!(repo.mark_used(token.id).await.unwrap());
        assert!(!repo.mark_used(token.id).await.unwrap());

        let token = repo.get_required(token.id).await.unwrap();
        assert!(!token.is_live(Utc::now()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_invalidate_only_touches_purpose(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn).await;
        let mut repo = UserTokens::new(&mut conn);

        repo.create(&token_request(user_id, TokenPurpose::PasswordReset)).await.unwrap();
        repo.create(&token_request(user_id, TokenPurpose::PasswordReset)).await.unwrap();
        let activation = repo.create(&token_request(user_id, TokenPurpose::Activation)).await.unwrap();

        assert_eq!(repo.invalidate_for_user(user_id, TokenPurpose::PasswordReset).await.unwrap(), 2);
        assert!(repo.get_required(activation.id).await.unwrap().used_at.is_none());

        let resets = repo
            .list(&UserTokenFilter {
                user_id: Some(user_id),
                purpose: Some(TokenPurpose::PasswordReset),
                skip: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(resets.len(), 2);
        assert!(resets.iter().all(|t| t.used_at.is_some()));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_attempts_spend_token(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn).await;
        let mut repo = UserTokens::new(&mut conn);

        let token = repo.create(&token_request(user_id, TokenPurpose::PasswordReset)).await.unwrap();
        assert_eq!(token.failed_attempts, 0);

        assert_eq!(repo.record_failed_attempt(token.id, 3).await.unwrap(), 1);
        assert_eq!(repo.record_failed_attempt(token.id, 3).await.unwrap(), 2);
        assert!(repo.get_required(token.id).await.unwrap().is_live(Utc::now()));

        assert_eq!(repo.record_failed_attempt(token.id, 3).await.unwrap(), 3);
        let spent = repo.get_required(token.id).await.unwrap();
        assert!(!spent.is_live(Utc::now()));
        assert!(!repo.mark_used(token.id).await.unwrap());

        assert!(matches!(
            repo.record_failed_attempt(Uuid::new_v4(), 3).await,
            Err(DbError::NotFound)
        ));
    }

    #[test]
    fn test_expired_token_is_not_live() {
        let now = Utc::now();
        let token = UserTokenDBResponse {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            purpose: TokenPurpose::PasswordReset,
            token_hash: String::new(),
            verify_code_hash: None,
            failed_attempts: 0,
            expires_at: now - Duration::seconds(1),
            created_at: now - Duration::minutes(31),
            used_at: None,
        };
        assert!(!token.is_live(now));
    }
}
