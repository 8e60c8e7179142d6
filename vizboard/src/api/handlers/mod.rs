//! HTTP request handlers for all API endpoints.
//!
//! Handlers are grouped by resource. Each one validates its input, checks permissions through
//! [`crate::auth::permissions`], talks to the database through the repositories in
//! [`crate::db::handlers`] and wraps the result in [`ResponseData`](crate::api::models::response::ResponseData).
//!
//! - [`users`]: Registration, activation, login and password flows
//! - [`organizations`]: Organizations and their members
//! - [`folders`]: The per-organization folder tree
//! - [`dashboards`]: Dashboards, widgets, archive and publication
//! - [`sources`]: Data source registration
//! - [`data_provider`]: Connection tests, metadata browsing and query execution
//! - [`config`]: Public site settings
//!
//! Handlers that need a signed-in user take a [`CurrentUser`](crate::api::models::users::CurrentUser)
//! argument, which rejects the request with 401 when the session token is missing or invalid.

pub mod config;
pub mod dashboards;
pub mod data_provider;
pub mod folders;
pub mod organizations;
pub mod sources;
pub mod users;
