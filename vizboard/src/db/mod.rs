//! Metadata store: users, organizations, folders, dashboards and sources.
//!
//! The store is a SQLite database accessed through SQLx. Queries are built at runtime, so the
//! crate compiles without a live database.
//!
//! ```text
//! api::handlers ──► db::handlers (repositories) ──► db::models ──► SQLite
//! ```
//!
//! - [`handlers`]: repository implementations for CRUD operations
//! - [`models`]: database record structures matching table schemas
//! - [`errors`]: database-specific error types
//!
//! # Transactions
//!
//! Repositories borrow a connection. Writes that span several tables take a transaction and
//! hand it to each repository in turn:
//!
//! ```ignore
//! let mut tx = state.db.begin().await?;
//! let dashboard = Dashboards::new(&mut tx).create(&request).await?;
//! Folders::new(&mut tx).create(&entry_for(&dashboard)).await?;
//! tx.commit().await?;
//! ```
//!
//! Schema migrations live in `migrations/` and run through [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
