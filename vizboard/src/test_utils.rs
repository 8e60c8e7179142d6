//! Test utilities for integration testing (available with `test-utils` feature).

use axum_test::TestServer;
use sqlx::{
    ConnectOptions, Connection, SqlitePool,
    sqlite::SqliteConnectOptions,
};
use tempfile::TempDir;

use crate::{
    AppState, build_router,
    api::models::users::CurrentUser,
    auth::{
        password::{Argon2Params, hash_string_with_params},
        session,
    },
    config::{Config, EmailTransportConfig, PasswordConfig},
    db::{
        handlers::{Organizations, Repository, Users},
        models::{
            organizations::{MemberRole, OrganizationCreateDBRequest, OrganizationDBResponse},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    provider::{DataProviderManager, SourceConfig},
    types::{OrgId, UserId},
};

/// Password given to every user made by [`create_test_user`].
pub const TEST_PASSWORD: &str = "password123";

pub fn create_test_config() -> Config {
    let mut config = Config {
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        enable_metrics: false,
        ..Config::default()
    };

    // Cheap hashing keeps the suite fast
    config.auth.native.password = PasswordConfig {
        argon2_memory_kib: 1024,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..PasswordConfig::default()
    };
    config.email.transport = EmailTransportConfig::File {
        path: std::env::temp_dir().join("vizboard-test-emails").display().to_string(),
    };

    config
}

pub fn create_test_state(pool: SqlitePool) -> AppState {
    create_test_state_with_config(pool, create_test_config())
}

pub fn create_test_state_with_config(pool: SqlitePool, config: Config) -> AppState {
    AppState::builder()
        .db(pool)
        .providers(DataProviderManager::new(config.data_provider.clone()))
        .config(config)
        .build()
}

pub async fn create_test_server(pool: SqlitePool) -> TestServer {
    create_test_server_with_config(pool, create_test_config()).await
}

pub async fn create_test_server_with_config(pool: SqlitePool, config: Config) -> TestServer {
    let state = create_test_state_with_config(pool, config);
    let router = build_router(&state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

async fn insert_user(pool: &SqlitePool, username: &str, is_admin: bool) -> UserDBResponse {
    let params = Argon2Params::from(&create_test_config().auth.native.password);
    let password_hash = hash_string_with_params(TEST_PASSWORD, params).expect("Failed to hash test password");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            name: None,
            avatar: None,
            description: None,
            password_hash: Some(password_hash),
            active: true,
            is_admin,
        })
        .await
        .expect("Failed to create test user")
}

/// An active user `username` with email `{username}@example.com` and password [`TEST_PASSWORD`].
pub async fn create_test_user(pool: &SqlitePool, username: &str) -> UserDBResponse {
    insert_user(pool, username, false).await
}

pub async fn create_test_admin(pool: &SqlitePool) -> UserDBResponse {
    insert_user(pool, "admin", true).await
}

/// An organization owned by `owner_id`.
pub async fn create_test_org(pool: &SqlitePool, owner_id: UserId, name: &str) -> OrganizationDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Organizations::new(&mut conn)
        .create(&OrganizationCreateDBRequest {
            name: name.to_string(),
            description: None,
            avatar: None,
            created_by: owner_id,
        })
        .await
        .expect("Failed to create test organization")
}

pub async fn add_test_member(pool: &SqlitePool, org_id: OrgId, user_id: UserId, role: MemberRole) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Organizations::new(&mut conn)
        .add_member(org_id, user_id, role)
        .await
        .expect("Failed to add test member");
}

/// `(header name, value)` carrying a session token for `user`, signed with the test config.
pub fn auth_header(user: &UserDBResponse) -> (String, String) {
    let current = CurrentUser::from(user.clone());
    let token = session::create_session_token(&current, &create_test_config()).expect("Failed to create session token");
    ("authorization".to_string(), format!("Bearer {token}"))
}

/// A SQLite data source holding a `sales` table of 25 rows and a `north_sales` view.
///
/// Regions cycle north, south, east starting at id 1. Row 1 has amount 10.5 and row 25 has a
/// null amount. Keep the returned directory alive for as long as the source is used.
pub async fn create_sample_source_db() -> (TempDir, SourceConfig) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("sample.db");

    let mut conn = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .connect()
        .await
        .expect("Failed to create sample database");

    sqlx::query(
        "CREATE TABLE sales (id INTEGER PRIMARY KEY, region TEXT NOT NULL, amount REAL, sold_at DATE, active BOOLEAN)",
    )
    .execute(&mut conn)
    .await
    .expect("Failed to create sales table");

    let regions = ["north", "south", "east"];
    for id in 1..=25_i64 {
        let amount = (id < 25).then(|| id as f64 * 10.0 + 0.5);
        sqlx::query("INSERT INTO sales (id, region, amount, sold_at, active) VALUES ($1, $2, $3, $4, $5)")
            .bind(id)
            .bind(regions[((id - 1) % 3) as usize])
            .bind(amount)
            .bind(format!("2024-01-{:02}", (id - 1) % 28 + 1))
            .bind(id % 2 == 0)
            .execute(&mut conn)
            .await
            .expect("Failed to insert sample row");
    }

    sqlx::query("CREATE VIEW north_sales AS SELECT * FROM sales WHERE region = 'north'")
        .execute(&mut conn)
        .await
        .expect("Failed to create view");

    conn.close().await.expect("Failed to close sample database");

    let config = SourceConfig {
        url: format!("sqlite://{}", path.display()),
        user: None,
        password: None,
        db_type: None,
        server_paging: true,
    };
    (dir, config)
}
