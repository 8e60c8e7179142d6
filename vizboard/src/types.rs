//! Common type definitions and permission types.
//!
//! # ID Types
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: User account identifier
//! - [`OrgId`]: Organization identifier
//! - [`FolderId`]: Folder tree entry identifier
//! - [`DashboardId`]: Dashboard identifier
//! - [`WidgetId`]: Dashboard widget identifier
//! - [`SourceId`]: Data source identifier
//!
//! # Permissions
//!
//! Authorization is org-scoped. A [`Permission`] names the role a caller must hold,
//! a [`Resource`] names what is being touched, and an [`Operation`] names the action.
//! System admins pass every check.
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type OrgId = Uuid;
pub type FolderId = Uuid;
pub type DashboardId = Uuid;
pub type WidgetId = Uuid;
pub type SourceId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Organizations,
    Members,
    Folders,
    Dashboards,
    Sources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Any member of the owning organization
    OrgMember,
    /// Owner of the owning organization
    OrgOwner,
    /// System administrator
    Admin,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Read => write!(f, "read"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Organizations => "organizations",
            Resource::Members => "members",
            Resource::Folders => "folders",
            Resource::Dashboards => "dashboards",
            Resource::Sources => "sources",
        };
        f.write_str(name)
    }
}
