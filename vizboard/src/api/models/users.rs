//! API request/response models for users and account flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::models::organizations::OrganizationResponse;
use crate::db::models::users::UserDBResponse;
use crate::types::UserId;

/// The authenticated caller, as carried in the session token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            is_admin: db.is_admin,
        }
    }
}

/// Request body for self-registration.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "ada")]
    pub username: String,
    #[schema(example = "ada@example.com")]
    pub email: String,
    pub password: String,
}

/// Request body for login. `username` may also be an email address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Public fields of a user, as shown in search results and after login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserBaseInfo {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub description: Option<String>,
}

impl From<UserDBResponse> for UserBaseInfo {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            name: db.name,
            avatar: db.avatar,
            description: db.description,
        }
    }
}

/// The current user's own profile.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: UserBaseInfo,
    pub active: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub organizations: Vec<OrganizationResponse>,
}

impl UserProfile {
    pub fn new(db: UserDBResponse, organizations: Vec<OrganizationResponse>) -> Self {
        Self {
            active: db.active,
            is_admin: db.is_admin,
            created_at: db.created_at,
            last_login: db.last_login,
            user: UserBaseInfo::from(db),
            organizations,
        }
    }
}

/// Profile fields a user may change. Omitted fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Completes a password reset started with `forget/password`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    /// Opaque token returned by `forget/password`
    pub token: String,
    /// Six digit code from the reset email
    pub verify_code: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchUsersQuery {
    /// Case-insensitive substring of username, email or name
    pub keyword: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActivateQuery {
    /// Token from the activation link
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SendMailQuery {
    pub username_or_email: String,
}

/// How `principal` identifies the account in a password reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum FindType {
    Email,
    Username,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ForgetPasswordQuery {
    #[serde(rename = "type")]
    pub find_type: FindType,
    pub principal: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_type_wire_names() {
        let query: ForgetPasswordQuery = serde_json::from_value(serde_json::json!({
            "type": "USERNAME",
            "principal": "ada"
        }))
        .unwrap();
        assert_eq!(query.find_type, FindType::Username);
        assert!(serde_json::from_value::<FindType>(serde_json::json!("PHONE")).is_err());
    }

    #[test]
    fn test_profile_flattens_base_info() {
        let now = Utc::now();
        let profile = UserProfile::new(
            UserDBResponse {
                id: uuid::Uuid::new_v4(),
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                name: Some("Ada".to_string()),
                avatar: None,
                description: None,
                password_hash: Some("secret-hash".to_string()),
                active: true,
                is_admin: false,
                created_at: now,
                updated_at: now,
                last_login: None,
            },
            vec![],
        );

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["username"], "ada");
        assert_eq!(json["name"], "Ada");
        assert_eq!(json["active"], true);
        assert!(json.get("password_hash").is_none());
    }
}
