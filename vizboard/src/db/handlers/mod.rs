//! Repository implementations for database access.
//!
//! Each repository wraps a borrowed SQLite connection (or transaction), builds its queries at
//! runtime and returns the models in [`crate::db::models`]. Callers decide the transaction scope:
//!
//! ```ignore
//! let mut tx = state.db.begin().await?;
//! let user = Users::new(&mut tx).create(&request).await?;
//! Organizations::new(&mut tx).create(&personal_org(&user)).await?;
//! tx.commit().await?;
//! ```
//!
//! - [`Users`]: user accounts and lookups for login
//! - [`UserTokens`]: activation and password reset tokens
//! - [`Organizations`]: organizations and memberships
//! - [`Folders`]: the folder tree
//! - [`Dashboards`] and [`Widgets`]
//! - [`Sources`]: data source definitions

pub mod dashboards;
pub mod folders;
pub mod organizations;
pub mod repository;
pub mod sources;
pub mod user_tokens;
pub mod users;
pub mod widgets;

pub use dashboards::Dashboards;
pub use folders::Folders;
pub use organizations::Organizations;
pub use repository::Repository;
pub use sources::Sources;
pub use user_tokens::UserTokens;
pub use users::Users;
pub use widgets::Widgets;
