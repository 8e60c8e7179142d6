//! Authentication and authorization.
//!
//! # Authentication
//!
//! Sessions are stateless JWTs signed with `secret_key`. Login and account activation return the
//! token in the `Authorization` response header; clients send it back in the `Authorization`
//! request header, with or without a `Bearer ` prefix. Logging out is a client-side operation.
//!
//! Passwords, activation tokens and password-reset verify codes are stored as Argon2id hashes.
//!
//! # Authorization
//!
//! Access is scoped to organizations: members can read an org's folders, dashboards and sources,
//! owners can manage members and sources. System admins bypass the org checks.
//!
//! # Modules
//!
//! - [`current_user`]: Extractor for the authenticated user in handlers
//! - [`password`]: Argon2 hashing, password policy, token and verify code generation
//! - [`permissions`]: Org membership and ownership checks
//! - [`session`]: JWT creation and verification
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use vizboard::api::models::users::CurrentUser;
//! use vizboard::auth::permissions::require_org_member;
//!
//! async fn list_things(State(state): State<AppState>, current_user: CurrentUser, Query(q): Query<OrgQuery>) -> Result<...> {
//!     let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
//!     require_org_member(&mut conn, &current_user, q.org_id, Operation::Read, Resource::Dashboards).await?;
//!     // ...
//! }
//! ```

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
