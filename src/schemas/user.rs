use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::core::time::format_primitive;
use crate::db::types::UserRole;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct UserLogin {
    #[validate(email(message = "email must be a valid address"))]
    pub(crate) email: String,
    pub(crate) password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AdminUserCreate {
    #[validate(email(message = "email must be a valid address"))]
    pub(crate) email: String,
    #[serde(alias = "fullName")]
    #[validate(length(min = 1, max = 200, message = "full_name must be 1-200 characters"))]
    pub(crate) full_name: String,
    pub(crate) password: String,
    #[serde(default = "default_user_role")]
    pub(crate) role: UserRole,
    #[serde(default = "default_true")]
    #[serde(alias = "isActive")]
    pub(crate) is_active: bool,
    #[serde(default)]
    #[serde(alias = "groupId")]
    pub(crate) group_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AdminUserUpdate {
    #[serde(default)]
    #[validate(email(message = "email must be a valid address"))]
    pub(crate) email: Option<String>,
    #[serde(default)]
    #[serde(alias = "fullName")]
    #[validate(length(min = 1, max = 200, message = "full_name must be 1-200 characters"))]
    pub(crate) full_name: Option<String>,
    #[serde(default)]
    pub(crate) password: Option<String>,
    #[serde(default)]
    pub(crate) role: Option<UserRole>,
    #[serde(default)]
    #[serde(alias = "isActive")]
    pub(crate) is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserGroupUpdate {
    #[serde(default)]
    #[serde(alias = "groupId")]
    pub(crate) group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserListQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
    #[serde(default)]
    pub(crate) role: Option<UserRole>,
    #[serde(default)]
    #[serde(alias = "groupId")]
    pub(crate) group_id: Option<String>,
    #[serde(default)]
    pub(crate) search: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserResponse {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) group_id: Option<String>,
    pub(crate) is_active: bool,
    pub(crate) created_at: String,
}

impl UserResponse {
    pub(crate) fn from_db(user: crate::db::models::User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            group_id: user.group_id,
            is_active: user.is_active,
            created_at: format_primitive(user.created_at),
        }
    }
}

fn default_user_role() -> UserRole {
    UserRole::Student
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn admin_user_create_defaults_to_active_student() {
        let payload: AdminUserCreate = serde_json::from_value(serde_json::json!({
            "email": "anna@example.com",
            "fullName": "Anna Petrova",
            "password": "password123"
        }))
        .expect("payload");

        assert_eq!(payload.role, UserRole::Student);
        assert!(payload.is_active);
        assert!(payload.group_id.is_none());
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn login_rejects_malformed_email() {
        let payload = UserLogin { email: "not-an-email".to_string(), password: "x".to_string() };
        assert!(payload.validate().is_err());
    }
}
