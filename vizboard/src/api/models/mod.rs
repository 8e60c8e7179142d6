//! API request and response data models.
//!
//! API models are distinct from the database models in [`crate::db::models`], so the storage
//! layout can change without changing the public contract. Every model is annotated with `utoipa`
//! for the OpenAPI document, and every response is wrapped in [`response::ResponseData`].
//!
//! - [`users`]: Registration, login, profile and password flows
//! - [`organizations`]: Organizations and memberships
//! - [`folders`]: The folder tree
//! - [`dashboards`]: Dashboards, widgets and archive/restore payloads
//! - [`sources`]: Data sources (passwords are never returned)
//! - [`data_provider`]: Query execution
//! - [`config`]: Public site settings

pub mod config;
pub mod dashboards;
pub mod data_provider;
pub mod folders;
pub mod organizations;
pub mod response;
pub mod sources;
pub mod users;
