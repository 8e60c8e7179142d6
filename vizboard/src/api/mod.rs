//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! Everything is served under `/api/v1`:
//!
//! - **Users** (`/users/*`): Registration, activation, login and profile
//! - **Organizations** (`/orgs/*`): Organizations and memberships
//! - **Visualization** (`/viz/folders/*`, `/viz/dashboards/*`): The folder tree and dashboards
//! - **Sources** (`/sources/*`): Data source connection settings
//! - **Data provider** (`/data-provider/*`): Metadata browsing and query execution
//!
//! All endpoints are documented with `utoipa`. The interactive reference is served at `/docs`.

pub mod handlers;
pub mod models;
