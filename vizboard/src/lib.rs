//! # vizboard: a self-hostable BI dashboard server
//!
//! `vizboard` stores users, organizations, a folder tree of dashboards and the connection settings
//! of SQL data sources, and runs queries against those sources on behalf of the dashboards.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). Metadata lives in a SQLite database
//! reached through SQLx and migrated on startup. Data sources are separate databases
//! (PostgreSQL, MySQL or SQLite) reached through the [`provider`] module, which keeps one
//! connection pool per source.
//!
//! ### Request flow
//!
//! Every API route lives under `/api/v1`. A handler extracts the
//! [`CurrentUser`](api::models::users::CurrentUser) from the session token in the `Authorization`
//! header, checks org membership through [`auth::permissions`], and works against the
//! repositories in [`db::handlers`]. Results go back in the
//! [`ResponseData`](api::models::response::ResponseData) envelope; errors are rendered by
//! [`errors::Error`] in the same envelope.
//!
//! ### Data sources
//!
//! Source passwords are encrypted with `secret_key` before they are stored. When a request needs
//! a source, the handler decrypts the config and asks the
//! [`DataProviderManager`](provider::DataProviderManager) for the cached
//! [`SqlAdapter`](provider::SqlAdapter). Updating or deleting the source evicts the adapter and
//! closes its pool.
//!
//! ## Configuration
//!
//! Configuration comes from a YAML file layered with `VIZBOARD_`-prefixed environment variables,
//! see [`config`]. `secret_key` is required: it signs session tokens and encrypts source passwords.
//!
//! ## Getting started
//!
//! ```no_run
//! use vizboard::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let app = Application::new(config).await?;
//!     app.serve(async { tokio::signal::ctrl_c().await.ok(); }).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
mod crypto;
pub mod db;
mod email;
pub mod errors;
mod openapi;
pub mod provider;
pub mod telemetry;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use std::str::FromStr;

use axum::{
    Router,
    http::{self, HeaderValue, Method},
    routing::{get, post, put},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;
use config::CorsOrigin;
pub use types::{DashboardId, FolderId, OrgId, SourceId, UserId, WidgetId};

use crate::{
    api::handlers::{config as site_config, dashboards, data_provider, folders, organizations, sources, users},
    auth::password::{self, Argon2Params},
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    openapi::ApiDoc,
    provider::DataProviderManager,
};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config.clone())
///     .providers(DataProviderManager::new(config.data_provider.clone()))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    /// Metadata store
    pub db: SqlitePool,
    pub config: Config,
    /// Cached connection pools of the data sources
    pub providers: DataProviderManager,
}

/// Get the vizboard database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent: an existing account with this email keeps its id, is promoted to active, and gets
/// its password replaced when one is given. The email doubles as the username.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(
    email: &str,
    password: Option<&str>,
    params: Argon2Params,
    db: &SqlitePool,
) -> anyhow::Result<UserId> {
    let password_hash = match password {
        Some(pwd) => Some(password::hash(pwd.to_string(), params).await?),
        None => None,
    };

    let mut tx = db.begin().await?;
    let mut users = Users::new(&mut tx);

    if let Some(existing) = users.get_user_by_email(email).await? {
        users
            .update(
                existing.id,
                &UserUpdateDBRequest {
                    password_hash,
                    active: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        tx.commit().await?;
        debug!("Initial admin user already exists");
        return Ok(existing.id);
    }

    let created = users
        .create(&UserCreateDBRequest {
            username: email.to_string(),
            email: email.to_string(),
            name: None,
            avatar: None,
            description: None,
            password_hash,
            active: true,
            is_admin: true,
        })
        .await?;

    tx.commit().await?;
    info!("Created initial admin user {}", email);
    Ok(created.id)
}

/// Open the metadata store, run migrations and make sure the admin account exists.
async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let settings = &config.database.pool;
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(settings.idle_timeout())
        .max_lifetime(settings.max_lifetime())
        .connect_with(options)
        .await?;

    migrator().run(&pool).await?;

    create_initial_admin_user(
        &config.admin_email,
        config.admin_password.as_deref(),
        Argon2Params::from(&config.auth.native.password),
        &pool,
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {e}"))?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.auth.security.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    // The session token travels in Authorization both ways, so browsers must be allowed to read it
    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(config.auth.security.cors.allow_credentials)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .expose_headers([http::header::AUTHORIZATION, http::header::LOCATION]);

    if let Some(max_age) = config.auth.security.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// Mounts `/healthz`, the API under `/api/v1`, its OpenAPI document and the Scalar reference at
/// `/docs`, and `/internal/metrics` when metrics are enabled. CORS and request tracing wrap
/// everything.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/config", get(site_config::get_config))
        // Accounts and sessions
        .route("/users", get(users::get_profile).put(users::update_user))
        .route("/users/register", post(users::register))
        .route("/users/search", get(users::search_users))
        .route("/users/active", get(users::activate))
        .route("/users/sendmail", post(users::send_activation_mail))
        .route("/users/change/password", put(users::change_password))
        .route("/users/forget/password", post(users::forget_password))
        .route("/users/reset/password", put(users::reset_password))
        .route("/users/login", post(users::login))
        .route("/users/logout", post(users::logout))
        // Organizations
        .route("/orgs", get(organizations::list_organizations).post(organizations::create_organization))
        .route("/orgs/{id}", get(organizations::get_organization))
        .route("/orgs/{id}/members", get(organizations::list_members))
        .route(
            "/orgs/{id}/members/{user_id}",
            post(organizations::add_member).delete(organizations::remove_member),
        )
        // Folder tree
        .route("/viz/folders", get(folders::list_folders).post(folders::create_folder))
        .route("/viz/folders/{id}", put(folders::update_folder).delete(folders::delete_folder))
        // Dashboards
        .route("/viz/dashboards", get(dashboards::list_dashboards).post(dashboards::create_dashboard))
        .route("/viz/dashboards/archived", get(dashboards::list_archived_dashboards))
        .route(
            "/viz/dashboards/{id}",
            get(dashboards::get_dashboard)
                .put(dashboards::update_dashboard)
                .delete(dashboards::delete_dashboard),
        )
        .route("/viz/dashboards/{id}/restore", put(dashboards::restore_dashboard))
        .route("/viz/dashboards/{id}/publish", put(dashboards::publish_dashboard))
        .route("/viz/dashboards/{id}/unpublish", put(dashboards::unpublish_dashboard))
        // Sources
        .route("/sources", get(sources::list_sources).post(sources::create_source))
        .route(
            "/sources/{id}",
            get(sources::get_source).put(sources::update_source).delete(sources::delete_source),
        )
        // Data provider
        .route("/data-provider/providers", get(data_provider::list_providers))
        .route("/data-provider/test", post(data_provider::test_connection))
        .route("/data-provider/execute", post(data_provider::execute))
        .route("/data-provider/{source_id}/databases", get(data_provider::list_databases))
        .route("/data-provider/{source_id}/{database}/tables", get(data_provider::list_tables))
        .route("/data-provider/{source_id}/{database}/{table}/columns", get(data_provider::list_columns))
        .route("/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The vizboard server.
///
/// 1. **Create**: [`Application::new`] opens and migrates the metadata store, ensures the admin
///    account exists and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and starts handling requests
/// 3. **Shutdown**: When the shutdown future resolves, in-flight requests finish, then source
///    pools, the metadata pool and telemetry are closed in that order
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting vizboard with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;

        let app_state = AppState::builder()
            .db(pool)
            .config(config.clone())
            .providers(DataProviderManager::new(config.data_provider.clone()))
            .build();

        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            app_state,
            config,
        })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "Vizboard listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing data source pools...");
        self.app_state.providers.close_all().await;

        info!("Closing database connections...");
        self.app_state.db.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
