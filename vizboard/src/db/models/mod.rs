//! Database record models matching table schemas.
//!
//! Each module holds the create/update request types a repository accepts, the row type it
//! returns (deriving `sqlx::FromRow`) and the filter used by `list`. Database models stay separate
//! from the API models in [`crate::api::models`] so storage and wire formats can evolve apart.
//!
//! - [`users`]: accounts and credentials
//! - [`user_tokens`]: single-use activation and password reset tokens
//! - [`organizations`]: organizations and their members
//! - [`folders`]: the folder tree that holds dashboards
//! - [`dashboards`]: dashboards and their widgets
//! - [`sources`]: data source connection settings

pub mod dashboards;
pub mod folders;
pub mod organizations;
pub mod sources;
pub mod user_tokens;
pub mod users;
